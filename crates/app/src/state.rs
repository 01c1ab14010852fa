use std::{fs, path::PathBuf};

use common::prelude::{SecretKey, Sigchain, SledClaimStore};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "keynode";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const KEY_FILE_NAME: &str = "key.pem";
pub const CHAIN_DIR_NAME: &str = "chain.sled";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Listen port for the peer node (optional, defaults to ephemeral)
    #[serde(default)]
    pub peer_port: Option<u16>,
    /// Whether to announce the node on the mainline DHT
    #[serde(default = "default_discovery")]
    pub discovery: bool,
}

fn default_discovery() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            peer_port: None,
            discovery: default_discovery(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the keynode directory (~/.keynode)
    pub keynode_dir: PathBuf,
    /// Path to the node key PEM file
    pub key_path: PathBuf,
    /// Path to the chain store directory
    pub chain_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the keynode directory path (custom or default ~/.keynode)
    pub fn keynode_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }
        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new keynode state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let keynode_dir = Self::keynode_dir(custom_path)?;

        if keynode_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }
        fs::create_dir_all(&keynode_dir)?;

        // Generate and save key
        let key = SecretKey::generate();
        let key_path = keynode_dir.join(KEY_FILE_NAME);
        fs::write(&key_path, key.to_pem())?;

        // Create config (use provided or default)
        let config = config.unwrap_or_default();
        let config_path = keynode_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        // Create the (empty) chain store
        let chain_path = keynode_dir.join(CHAIN_DIR_NAME);
        SledClaimStore::open(&chain_path).map_err(|e| StateError::Chain(e.to_string()))?;

        Ok(Self {
            keynode_dir,
            key_path,
            chain_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the keynode directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let keynode_dir = Self::keynode_dir(custom_path)?;

        if !keynode_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let key_path = keynode_dir.join(KEY_FILE_NAME);
        let chain_path = keynode_dir.join(CHAIN_DIR_NAME);
        let config_path = keynode_dir.join(CONFIG_FILE_NAME);

        if !key_path.exists() {
            return Err(StateError::MissingFile(KEY_FILE_NAME.to_string()));
        }
        if !chain_path.exists() {
            return Err(StateError::MissingFile(CHAIN_DIR_NAME.to_string()));
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            keynode_dir,
            key_path,
            chain_path,
            config_path,
            config,
        })
    }

    /// Load the secret key from the key file
    pub fn load_key(&self) -> Result<SecretKey, StateError> {
        let pem = fs::read_to_string(&self.key_path)?;
        let key = SecretKey::from_pem(&pem).map_err(|e| StateError::InvalidKey(e.to_string()))?;
        Ok(key)
    }

    /// Open the node's chain from disk
    ///
    /// Re-verifies the whole chain; a corrupt store fails here rather than
    /// at first use.
    pub async fn open_chain(&self) -> Result<Sigchain<SledClaimStore>, StateError> {
        let key = self.load_key()?;
        let store = SledClaimStore::open(&self.chain_path)
            .map_err(|e| StateError::Chain(e.to_string()))?;
        Sigchain::open(store, key)
            .await
            .map_err(|e| StateError::Chain(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("keynode directory not initialized. Run 'keynode init' first")]
    NotInitialized,

    #[error("keynode directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("chain store error: {0}")]
    Chain(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node");

        let state = AppState::init(Some(path.clone()), None).unwrap();
        assert!(state.key_path.exists());
        assert!(state.chain_path.exists());

        let loaded = AppState::load(Some(path.clone())).unwrap();
        assert_eq!(loaded.config.peer_port, None);
        assert!(loaded.config.discovery);

        // the key survives the PEM round trip and opens the chain
        let chain = loaded.open_chain().await.unwrap();
        assert_eq!(chain.node_id(), state.load_key().unwrap().public());

        assert!(matches!(
            AppState::init(Some(path), None),
            Err(StateError::AlreadyInitialized)
        ));
    }
}
