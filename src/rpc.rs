use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::config::RpcSendTransactionConfig;
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction
};
use std::{fmt, time::Duration};
use tokio::time::Instant;
use crate::{
    config::ConfirmationConfig,
    error::{EscrowError, Result}
};


/// Token account balance as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    /// Raw amount in base units
    pub amount: u64,
    pub decimals: u8,
    pub ui_amount: String
}

impl fmt::Display for TokenBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ui_amount)
    }
}

/// The slice of the JSON-RPC API the escrow flows rely on.
///
/// Every call is a single request / response; nothing here retries.
#[allow(async_fn_in_trait)]
pub trait EscrowRpc {
    /// Account data, or `None` when the account does not exist (or was closed).
    async fn account_data(&self, pubkey: &Pubkey) -> Result<Option<Vec<u8>>>;

    async fn latest_blockhash(&self) -> Result<Hash>;

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64>;

    /// Submits a signed transaction with preflight checks at `confirmed`.
    async fn send_transaction(&self, tx: &Transaction) -> Result<Signature>;

    /// `None` while the signature has not reached the client's commitment,
    /// `Some(Err(..))` when it landed but failed.
    async fn signature_status(&self, signature: &Signature) -> Result<Option<std::result::Result<(), String>>>;

    async fn token_account_balance(&self, pubkey: &Pubkey) -> Result<TokenBalance>;

    async fn balance(&self, pubkey: &Pubkey) -> Result<u64>;

    async fn request_airdrop(&self, pubkey: &Pubkey, lamports: u64) -> Result<Signature>;
}

impl EscrowRpc for RpcClient {
    async fn account_data(&self, pubkey: &Pubkey) -> Result<Option<Vec<u8>>> {
        let response = self.get_account_with_commitment(pubkey, self.commitment()).await?;
        Ok(response.value.map(|account| account.data))
    }

    async fn latest_blockhash(&self) -> Result<Hash> {
        Ok(self.get_latest_blockhash().await?)
    }

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64> {
        Ok(self.get_minimum_balance_for_rent_exemption(data_len).await?)
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(self.commitment().commitment),
            ..RpcSendTransactionConfig::default()
        };
        Ok(self.send_transaction_with_config(tx, config).await?)
    }

    async fn signature_status(&self, signature: &Signature) -> Result<Option<std::result::Result<(), String>>> {
        let status = self
            .get_signature_status_with_commitment(signature, self.commitment())
            .await?;
        Ok(status.map(|result| result.map_err(|e| e.to_string())))
    }

    async fn token_account_balance(&self, pubkey: &Pubkey) -> Result<TokenBalance> {
        let ui = self.get_token_account_balance(pubkey).await?;
        let amount: u64 = ui.amount.parse().map_err(|_| {
            EscrowError::Encoding(format!("token balance {} of {pubkey} is not a u64", ui.amount))
        })?;

        Ok(TokenBalance {
            amount,
            decimals: ui.decimals,
            ui_amount: ui.ui_amount_string
        })
    }

    async fn balance(&self, pubkey: &Pubkey) -> Result<u64> {
        Ok(self.get_balance(pubkey).await?)
    }

    async fn request_airdrop(&self, pubkey: &Pubkey, lamports: u64) -> Result<Signature> {
        Ok(RpcClient::request_airdrop(self, pubkey, lamports).await?)
    }
}

/// Polls `signature` until it is confirmed, doubling the wait between polls
/// up to `max_backoff_ms`, and gives up after `timeout_ms`.
pub async fn wait_for_confirmation<R: EscrowRpc>(
    rpc: &R,
    signature: &Signature,
    config: &ConfirmationConfig
) -> Result<()> {
    let deadline: Instant = Instant::now() + config.timeout();
    let max_backoff: Duration = Duration::from_millis(config.max_backoff_ms.max(1));
    let mut backoff: Duration = Duration::from_millis(config.initial_backoff_ms.max(1)).min(max_backoff);

    loop {
        match rpc.signature_status(signature).await? {
            Some(Ok(())) => {
                log::debug!("Transaction {} confirmed", signature);
                return Ok(());
            },
            Some(Err(reason)) => {
                return Err(EscrowError::TransactionFailed { signature: *signature, reason });
            },
            None => {}
        }

        let now: Instant = Instant::now();
        if now >= deadline {
            return Err(EscrowError::ConfirmationTimeout {
                signature: *signature,
                timeout_ms: config.timeout_ms
            });
        }

        let wait: Duration = backoff.min(deadline - now);
        log::debug!("Transaction {} not confirmed yet, polling again in {:?}", signature, wait);
        tokio::time::sleep(wait).await;
        backoff = (backoff * 2).min(max_backoff);
    }
}

pub async fn send_and_confirm<R: EscrowRpc>(
    rpc: &R,
    tx: &Transaction,
    config: &ConfirmationConfig
) -> Result<Signature> {
    log::info!("Sending transaction!");
    let signature: Signature = rpc.send_transaction(tx).await?;
    wait_for_confirmation(rpc, &signature, config).await?;
    log::info!("Success! Tx signature: {}", signature);
    Ok(signature)
}
