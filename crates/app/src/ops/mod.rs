pub mod chain;
pub mod daemon;
pub mod id;
pub mod identity;
pub mod init;
pub mod link;

pub use chain::Chain;
pub use daemon::Daemon;
pub use id::Id;
pub use identity::Identity;
pub use init::Init;
pub use link::Link;
