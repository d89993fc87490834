use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::Signature,
    signer::{Signer, keypair::Keypair}
};
use super::EscrowClient;
use crate::{
    derive_escrow_pda,
    error::{EscrowError, Result},
    instruction::{self, ExchangeAccounts},
    keystore::{self, AddressStore},
    rpc::{EscrowRpc, TokenBalance},
    state::EscrowOperation
};


#[derive(Debug)]
pub struct ExchangeOutcome {
    pub signature: Signature,
    pub escrow_pda: Pubkey,
    /// Initiator's receiving balance and counterparty's receiving balance before the trade
    pub balances_before: (TokenBalance, TokenBalance),
    pub balances_after: (TokenBalance, TokenBalance)
}

impl<R: EscrowRpc, S: AddressStore> EscrowClient<R, S> {
    /// Takes the initiator's offer: the counterparty pays the expected amount and
    /// receives the escrowed tokens. Succeeds only once the program has closed the
    /// temp token account and the escrow account.
    pub async fn exchange_escrow(&self) -> Result<ExchangeOutcome> {
        let alice: Pubkey = self.store.require_pubkey(keystore::ALICE)?;
        let bob: Keypair = self.store.require_keypair(keystore::BOB)?;
        let bob_usdc: Pubkey = self.store.require_pubkey(keystore::BOB_USDC_TOKEN)?;
        let bob_usdt: Pubkey = self.store.require_pubkey(keystore::BOB_USDT_TOKEN)?;
        let temp_token: Pubkey = self.store.require_pubkey(keystore::ALICE_TEMP_TOKEN)?;
        let alice_usdt: Pubkey = self.store.require_pubkey(keystore::ALICE_USDT_TOKEN)?;
        let escrow_account: Pubkey = self.store.require_pubkey(keystore::ESCROW_ACCOUNT)?;

        let ids = self.config.program_ids();

        // 1. load escrow state & make sure the escrowed tokens are still there
        let (state, settled) = self.load_escrow(&escrow_account, EscrowOperation::Exchange).await?;
        if self.rpc.account_data(&temp_token).await?.is_none() {
            return Err(EscrowError::AccountNotFound(temp_token));
        }

        if state.initiator != alice || state.initiator_temp_token_account != temp_token {
            return Err(EscrowError::InvariantViolation(format!(
                "escrow {escrow_account} belongs to {} with temp account {}, key store has {alice} and {temp_token}",
                state.initiator, state.initiator_temp_token_account
            )));
        }

        // 2. recompute the PDA from the stored bump
        let escrow_pda: Pubkey = derive_escrow_pda(&alice, state.pda_bump, &ids.escrow)?;

        let balances_before = self.exchange_balances(&alice_usdt, &bob_usdc).await?;

        // 3. craft exchange ix, sign with bob & send it
        let exchange_escrow_ix: Instruction = instruction::exchange(
            &ids,
            &ExchangeAccounts {
                counterparty: bob.pubkey(),
                counterparty_send_token_account: bob_usdt,
                counterparty_receive_token_account: bob_usdc,
                initiator_temp_token_account: temp_token,
                initiator: alice,
                initiator_receiving_token_account: alice_usdt,
                escrow_account,
                escrow_pda
            },
            self.config.counterparty_expected_amount
        );

        log::info!("Sending escrow exchange transaction");
        let signature: Signature = self.submit(&[exchange_escrow_ix], &[&bob]).await?;

        // 4. settlement closes both accounts atomically
        self.verify_closed(&temp_token, &escrow_account, settled).await?;
        self.forget_escrow()?;
        log::info!("Accounts are closed, trade complete");

        let balances_after = self.exchange_balances(&alice_usdt, &bob_usdc).await?;

        Ok(ExchangeOutcome {
            signature,
            escrow_pda,
            balances_before,
            balances_after
        })
    }

    async fn exchange_balances(&self, alice_usdt: &Pubkey, bob_usdc: &Pubkey) -> Result<(TokenBalance, TokenBalance)> {
        let alice_balance = self.print_balance("Alice", alice_usdt, keystore::USDT).await?;
        let bob_balance = self.print_balance("Bob", bob_usdc, keystore::USDC).await?;
        Ok((alice_balance, bob_balance))
    }
}
