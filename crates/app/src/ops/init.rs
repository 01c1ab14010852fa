use clap::Args;

use crate::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Peer node listen port (optional, defaults to ephemeral port if not specified)
    #[arg(long)]
    pub peer_port: Option<u16>,

    /// Disable DHT discovery for this node
    #[arg(long)]
    pub no_discovery: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            peer_port: self.peer_port,
            discovery: !self.no_discovery,
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;
        let node_id = state.load_key()?.public();

        let peer_port_str = match state.config.peer_port {
            Some(port) => format!("{}", port),
            None => "ephemeral (auto-assigned)".to_string(),
        };

        let output = format!(
            "Initialized keynode directory at: {}\n\
             - Node id: {}\n\
             - Key: {}\n\
             - Chain: {}\n\
             - Config: {}\n\
             - Peer port: {}\n\
             - Discovery: {}",
            state.keynode_dir.display(),
            node_id.to_hex(),
            state.key_path.display(),
            state.chain_path.display(),
            state.config_path.display(),
            peer_port_str,
            state.config.discovery
        );

        Ok(output)
    }
}
