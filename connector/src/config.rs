use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::error::ConnectorError;

pub const DEFAULT_CCU_FREQUENCY: u32 = 10;
pub const DEFAULT_MAX_CCU_SIZE: usize = 10_240;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    /// WebSocket endpoint of the sending chain node.
    pub sending_chain_ws_url: String,
    /// Exactly one of the two receiving-chain transports must be set.
    pub receiving_chain_ws_url: Option<String>,
    pub receiving_chain_ipc_path: Option<String>,
    /// Minimum block gap between the observed tip and the last certified
    /// height before a CCU attempt.
    #[serde(default = "default_ccu_frequency")]
    pub ccu_frequency: u32,
    /// Byte budget for an assembled CCU transaction.
    #[serde(default = "default_max_ccu_size")]
    pub max_ccu_size: usize,
    /// Relayer signing key, encrypted with `password`.
    pub encrypted_private_key: String,
    pub password: Option<String>,
    /// Fee assigned to each submitted CCU.
    pub ccu_fee: u64,
    /// Record assembled CCUs without posting them.
    #[serde(default)]
    pub save_ccu: bool,
    /// Also relay CCMs whose processing bounced them back.
    #[serde(default)]
    pub forward_bounced_ccms: bool,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

fn default_ccu_frequency() -> u32 {
    DEFAULT_CCU_FREQUENCY
}

fn default_max_ccu_size() -> usize {
    DEFAULT_MAX_CCU_SIZE
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./connector-data")
}

fn get_env_var(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

impl Config {
    /// Parse config from a TOML file, applying environment overrides.
    ///
    /// # Errors
    /// * config file not exists
    /// * incorrect config
    pub fn new(file: &str) -> Result<Self, ConnectorError> {
        let config_toml = fs::read_to_string(file)
            .map_err(|e| ConnectorError::Config(format!("failed to read {file}: {e}")))?;
        let mut config: Config = toml::from_str(&config_toml)
            .map_err(|e| ConnectorError::Config(format!("failed to parse {file}: {e}")))?;

        config.sending_chain_ws_url =
            get_env_var("SENDING_CHAIN_WS_URL").unwrap_or(config.sending_chain_ws_url);
        config.receiving_chain_ws_url =
            get_env_var("RECEIVING_CHAIN_WS_URL").or(config.receiving_chain_ws_url);
        config.receiving_chain_ipc_path =
            get_env_var("RECEIVING_CHAIN_IPC_PATH").or(config.receiving_chain_ipc_path);
        config.password = get_env_var("CONNECTOR_PASSWORD").or(config.password);

        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// * neither or both receiving-chain transports configured
    /// * missing key password
    pub fn validate(&self) -> Result<(), ConnectorError> {
        match (
            self.receiving_chain_ws_url.as_ref(),
            self.receiving_chain_ipc_path.as_ref(),
        ) {
            (Some(_), Some(_)) => Err(ConnectorError::Config(
                "receiving_chain_ws_url and receiving_chain_ipc_path are mutually exclusive"
                    .to_string(),
            )),
            (None, None) => Err(ConnectorError::Config(
                "one of receiving_chain_ws_url or receiving_chain_ipc_path is required"
                    .to_string(),
            )),
            _ => Ok(()),
        }?;

        if self.password.as_deref().unwrap_or("").is_empty() {
            return Err(ConnectorError::Config(
                "password is required to decrypt the relayer key".to_string(),
            ));
        }

        Ok(())
    }
}
