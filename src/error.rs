use solana_program::program_error::ProgramError;
use solana_rpc_client_api::client_error::Error as ClientError;
use solana_sdk::{pubkey::Pubkey, signature::Signature, signer::SignerError};
use thiserror::Error;


pub type Result<T> = std::result::Result<T, EscrowError>;

#[derive(Debug, Error)]
pub enum EscrowError {
    /// A nickname was never written to the key store.
    #[error("missing address for `{0}`, run `escrow store` and `escrow setup` first")]
    MissingAddress(String),

    #[error("escrow account layout mismatch: expected {expected} bytes, got {actual}")]
    Layout { expected: usize, actual: usize },

    #[error("escrow account has invalid is_initialized flag {0}")]
    InvalidFlag(u8),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("rpc failure: {0}")]
    Rpc(Box<ClientError>),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("account {0} not found on chain")]
    AccountNotFound(Pubkey),

    #[error("escrow PDA could not be derived for initiator {initiator} with bump {bump}")]
    InvalidPda { initiator: Pubkey, bump: u8 },

    #[error("transaction {signature} was not confirmed within {timeout_ms} ms")]
    ConfirmationTimeout { signature: Signature, timeout_ms: u64 },

    #[error("transaction {signature} failed: {reason}")]
    TransactionFailed { signature: Signature, reason: String },

    #[error("failed to build token instruction: {0}")]
    TokenInstruction(#[from] ProgramError),

    #[error("failed to sign transaction: {0}")]
    Signing(#[from] SignerError),

    #[error("key store error: {0}")]
    KeyStore(#[from] std::io::Error),

    #[error("key store record is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl From<ClientError> for EscrowError {
    fn from(e: ClientError) -> Self {
        Self::Rpc(Box::new(e))
    }
}

impl EscrowError {
    /// True for errors that only mean "nothing to do yet".
    pub fn is_missing_address(&self) -> bool {
        matches!(self, Self::MissingAddress(_))
    }
}
