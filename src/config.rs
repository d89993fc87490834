//! Client configuration

use serde::{Deserialize, Serialize};
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};
use std::{path::PathBuf, time::Duration};
use crate::error::{EscrowError, Result};

pub const DEFAULT_ESCROW_PROGRAM: Pubkey = solana_sdk::pubkey!("FZoqAsnuaq832FezFs7bNeuNtHHg7c8QsnJqmKM9JpCm");
pub const DEFAULT_CONFIG_PATH: &str = "escrow-config.toml";
pub const CONFIG_ENV: &str = "ESCROW_CONFIG";

/// Programs every escrow instruction refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramIds {
    pub escrow: Pubkey,
    pub token: Pubkey
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// RPC URL for the Solana cluster
    pub rpc_url: String,

    /// Escrow program the instructions are sent to
    #[serde(with = "pubkey_string")]
    pub escrow_program_id: Pubkey,

    #[serde(with = "pubkey_string")]
    pub token_program_id: Pubkey,

    /// Directory holding the nickname key store
    pub keys_dir: PathBuf,

    /// Decimals of both test mints
    pub token_decimals: u8,

    /// Amount (base units) the initiator expects back from the counterparty
    pub initiator_expected_amount: u64,

    /// Amount (base units) the initiator escrows, and the counterparty expects
    pub counterparty_expected_amount: u64,

    /// SOL airdropped to each party during setup
    pub airdrop_sol: u64,

    /// Whole tokens minted to each party's token accounts during setup
    pub mint_ui_amount: u64,

    pub confirmation: ConfirmationConfig
}

/// Bounded polling of a submitted signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    pub timeout_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64
}

impl ConfirmationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn commitment(&self) -> CommitmentConfig {
        CommitmentConfig::confirmed()
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000
        }
    }
}

impl Config {
    /// Loads the TOML file named by `ESCROW_CONFIG`, falling back to the localhost defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV)
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        match std::fs::read_to_string(&config_path) {
            Ok(config_str) => Self::from_toml(&config_str),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("No config at {}, using localhost defaults", config_path);
                Ok(Self::default_localhost())
            },
            Err(e) => Err(EscrowError::Config(format!("failed to read {config_path}: {e}")))
        }
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        toml::from_str(config_str)
            .map_err(|e| EscrowError::Config(format!("failed to parse config TOML: {e}")))
    }

    pub fn default_localhost() -> Self {
        Self {
            rpc_url: "http://localhost:8899".to_string(),
            escrow_program_id: DEFAULT_ESCROW_PROGRAM,
            token_program_id: spl_token::id(),
            keys_dir: PathBuf::from("keys"),
            token_decimals: 6,
            initiator_expected_amount: 10_000_000,
            counterparty_expected_amount: 5_000_000,
            airdrop_sol: 100,
            mint_ui_amount: 1000,
            confirmation: ConfirmationConfig::default()
        }
    }

    /// Write default config to file
    pub fn write_default(path: &str) -> Result<()> {
        let toml_str = toml::to_string_pretty(&Self::default_localhost())
            .map_err(|e| EscrowError::Config(format!("failed to serialize config: {e}")))?;

        std::fs::write(path, toml_str)?;

        log::info!("Created default config at {}", path);
        Ok(())
    }

    pub fn program_ids(&self) -> ProgramIds {
        ProgramIds {
            escrow: self.escrow_program_id,
            token: self.token_program_id
        }
    }
}

mod pubkey_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(pubkey: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(pubkey)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pubkey, D::Error> {
        let s = String::deserialize(deserializer)?;
        Pubkey::from_str(&s).map_err(|e| D::Error::custom(format!("invalid pubkey {s}: {e}")))
    }
}
