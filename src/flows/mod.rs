//! Escrow flows: each one resolves addresses from the key store, builds and
//! submits one or more transactions, then re-reads the cluster to check the
//! outcome. Flows are strictly sequential and never retry.

mod cancel;
mod exchange;
mod initialize;
mod setup;
mod store;

pub use cancel::CancelOutcome;
pub use exchange::ExchangeOutcome;
pub use initialize::InitializeOutcome;
pub use setup::SetupOutcome;

use solana_sdk::{
    instruction::Instruction,
    message::Message,
    pubkey::Pubkey,
    signature::Signature,
    signer::{Signer, keypair::Keypair},
    transaction::Transaction
};
use crate::{
    Config,
    error::{EscrowError, Result},
    instruction::{roles_for, verify_account_roles},
    keystore::{self, AddressStore},
    rpc::{self, EscrowRpc, TokenBalance},
    state::{EscrowOperation, EscrowPhase, EscrowState}
};


pub struct EscrowClient<R, S> {
    config: Config,
    rpc: R,
    store: S
}

impl<R: EscrowRpc, S: AddressStore> EscrowClient<R, S> {
    pub fn new(config: Config, rpc: R, store: S) -> Self {
        Self { config, rpc, store }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Prints the balances of both parties' token accounts.
    pub async fn balances(&self) -> Result<Vec<(String, TokenBalance)>> {
        let accounts = [
            (keystore::ALICE_USDC_TOKEN, keystore::USDC),
            (keystore::ALICE_USDT_TOKEN, keystore::USDT),
            (keystore::BOB_USDC_TOKEN, keystore::USDC),
            (keystore::BOB_USDT_TOKEN, keystore::USDT)
        ];

        let mut resolved: Vec<(&str, &str, Pubkey)> = Vec::with_capacity(accounts.len());
        for (nickname, token) in accounts {
            resolved.push((nickname, token, self.store.require_pubkey(nickname)?));
        }

        let mut balances = Vec::with_capacity(resolved.len());
        for (nickname, token, pubkey) in resolved {
            let balance = self.print_balance(nickname, &pubkey, token).await?;
            balances.push((nickname.to_string(), balance));
        }
        Ok(balances)
    }

    /// Signs `instructions` with `signers` (the first one pays), submits them as one
    /// transaction and waits for confirmation.
    ///
    /// Escrow instructions are checked against their account role table first.
    pub(crate) async fn submit(&self, instructions: &[Instruction], signers: &[&Keypair]) -> Result<Signature> {
        for ix in instructions.iter().filter(|ix| ix.program_id == self.config.escrow_program_id) {
            verify_account_roles(ix, roles_for(&ix.data)?)?;
        }

        let payer: &Keypair = signers.first().ok_or_else(|| {
            EscrowError::InvariantViolation("a transaction needs at least one signer".to_string())
        })?;

        let message: Message = Message::new(instructions, Some(&payer.pubkey()));
        let mut tx: Transaction = Transaction::new_unsigned(message);

        let latest_blockhash = self.rpc.latest_blockhash().await?;
        tx.try_sign(signers, latest_blockhash)?;

        rpc::send_and_confirm(&self.rpc, &tx, &self.config.confirmation).await
    }

    /// Fetches and decodes the escrow account, and checks `operation` is legal on it.
    ///
    /// Returns the decoded state and the phase the escrow must reach once the
    /// program has executed `operation`.
    pub(crate) async fn load_escrow(
        &self,
        escrow_account: &Pubkey,
        operation: EscrowOperation
    ) -> Result<(EscrowState, EscrowPhase)> {
        let data = self.rpc
            .account_data(escrow_account)
            .await?
            .ok_or(EscrowError::AccountNotFound(*escrow_account))?;

        let phase = EscrowPhase::observe(Some(data.as_slice()), EscrowPhase::Uninitialized)?;
        let next = phase.apply(operation)?;

        match phase {
            EscrowPhase::Initialized(state) => Ok((state, next)),
            _ => Err(EscrowError::InvariantViolation(format!(
                "escrow account {escrow_account} is not initialized"
            )))
        }
    }

    /// Re-reads the temp token account and the escrow account after an exchange
    /// or a cancel; the program must have closed both.
    ///
    /// An account that still exists counts as open whatever its data holds.
    pub(crate) async fn verify_closed(
        &self,
        temp_token_account: &Pubkey,
        escrow_account: &Pubkey,
        expected: EscrowPhase
    ) -> Result<()> {
        let temp_after = self.rpc.account_data(temp_token_account).await?;
        let escrow_after = self.rpc.account_data(escrow_account).await?;

        let escrow_closed: bool = match escrow_after.as_deref() {
            None => EscrowPhase::observe(None, expected)?.is_closed(),
            Some(data) => {
                match EscrowPhase::observe(Some(data), expected) {
                    Ok(phase) => log::debug!("Escrow account {} is still {:?}", escrow_account, phase),
                    Err(e) => log::debug!("Escrow account {} is still present and unreadable: {}", escrow_account, e)
                }
                false
            }
        };

        let mut still_open: Vec<String> = Vec::new();
        if temp_after.is_some() {
            still_open.push(format!("temp token account {temp_token_account}"));
        }
        if !escrow_closed {
            still_open.push(format!("escrow account {escrow_account}"));
        }

        if !still_open.is_empty() {
            return Err(EscrowError::InvariantViolation(format!(
                "accounts were not closed, check the escrow program: {}",
                still_open.join(", ")
            )));
        }

        Ok(())
    }

    pub(crate) async fn print_balance(&self, label: &str, token_account: &Pubkey, token: &str) -> Result<TokenBalance> {
        let balance = self.rpc.token_account_balance(token_account).await?;
        log::info!("{} balance: {} {}", label, balance, token);
        Ok(balance)
    }

    pub(crate) fn forget_escrow(&self) -> Result<()> {
        self.store.remove(keystore::ESCROW_ACCOUNT)?;
        self.store.remove(keystore::ALICE_TEMP_TOKEN)?;
        Ok(())
    }
}
