use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::AppResult;
use crate::store::models::Network;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub rpc_url: String,
    /// HTTP/HTTPS/SOCKS5 proxy for RPC requests
    pub rpc_proxy: Option<String>,
    /// RPC username for authentication
    pub rpc_user: Option<String>,
    /// RPC password for authentication
    pub rpc_password: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub network: Network,
    /// Directory holding the per-network migration plan files
    pub data_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MigrationConfig {
    pub miner_fee: Decimal,
    pub min_amount: Decimal,
    pub default_parts: usize,
    pub default_block_window: u64,
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub node: NodeConfig,
    pub wallet: WalletConfig,
    pub migration: MigrationConfig,
}

impl AppConfig {
    pub fn load() -> AppResult<Self> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            // Server defaults
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8090)?
            // Node defaults
            .set_default("node.rpc_url", "http://127.0.0.1:8232")?
            .set_default("node.rpc_proxy", Option::<String>::None)?
            .set_default("node.rpc_user", Option::<String>::None)?
            .set_default("node.rpc_password", Option::<String>::None)?
            .set_default("node.timeout_secs", 30)?
            // Wallet defaults
            .set_default("wallet.network", "main")?
            .set_default("wallet.data_dir", "data")?
            // Migration defaults
            .set_default("migration.miner_fee", "0.0001")?
            .set_default("migration.min_amount", "0.0005")?
            .set_default("migration.default_parts", 10)?
            .set_default("migration.default_block_window", 500)?
            .set_default("migration.refresh_interval_secs", 20)?
            // Load from config.toml if exists
            .add_source(File::with_name("config").required(false))
            // Override with environment variables (prefix: TURNSTILE_)
            // Use __ as separator so TURNSTILE_NODE__RPC_URL -> node.rpc_url
            .add_source(
                Environment::with_prefix("TURNSTILE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;

        app_config.validate()?;

        Ok(app_config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.node.rpc_url.is_empty() {
            return Err(ConfigError::Message(
                "Node RPC URL cannot be empty".to_string(),
            ));
        }

        if self.migration.miner_fee <= Decimal::ZERO {
            return Err(ConfigError::Message(
                "Miner fee must be positive".to_string(),
            ));
        }
        if self.migration.min_amount < Decimal::ZERO {
            return Err(ConfigError::Message(
                "Minimum migration amount cannot be negative".to_string(),
            ));
        }
        if self.migration.default_parts == 0 {
            return Err(ConfigError::Message(
                "Default number of parts must be at least 1".to_string(),
            ));
        }
        if self.migration.refresh_interval_secs == 0 {
            return Err(ConfigError::Message(
                "Refresh interval cannot be zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8090,
            },
            node: NodeConfig {
                rpc_url: "http://127.0.0.1:8232".to_string(),
                rpc_proxy: None,
                rpc_user: None,
                rpc_password: None,
                timeout_secs: 30,
            },
            wallet: WalletConfig {
                network: Network::Main,
                data_dir: "data".to_string(),
            },
            migration: MigrationConfig {
                miner_fee: Decimal::new(1, 4),
                min_amount: Decimal::new(5, 4),
                default_parts: 10,
                default_block_window: 500,
                refresh_interval_secs: 20,
            },
        }
    }
}
