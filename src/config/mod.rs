pub mod paths;
pub mod settings;
pub mod ssh_config;

pub use settings::{AppConfig, HostKeyPolicy, HostsSettings, SshSettings, TrustStoreFailure};
pub use ssh_config::HostEntry;
