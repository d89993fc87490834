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
    instruction::{self, CancelAccounts},
    keystore::{self, AddressStore},
    rpc::{EscrowRpc, TokenBalance},
    state::EscrowOperation
};


#[derive(Debug)]
pub struct CancelOutcome {
    pub signature: Signature,
    pub escrow_pda: Pubkey,
    pub balance_before: TokenBalance,
    pub balance_after: TokenBalance
}

impl<R: EscrowRpc, S: AddressStore> EscrowClient<R, S> {
    /// Cancels the pending trade and returns the escrowed tokens to the initiator.
    ///
    /// Like the exchange, this only forgets the escrow records once the program has
    /// closed both the temp token account and the escrow account.
    pub async fn cancel_escrow(&self) -> Result<CancelOutcome> {
        let alice: Keypair = self.store.require_keypair(keystore::ALICE)?;
        let alice_usdc: Pubkey = self.store.require_pubkey(keystore::ALICE_USDC_TOKEN)?;
        let temp_token: Pubkey = self.store.require_pubkey(keystore::ALICE_TEMP_TOKEN)?;
        let escrow_account: Pubkey = self.store.require_pubkey(keystore::ESCROW_ACCOUNT)?;

        let ids = self.config.program_ids();

        let (state, cancelled) = self.load_escrow(&escrow_account, EscrowOperation::Cancel).await?;
        if state.initiator != alice.pubkey() || state.initiator_temp_token_account != temp_token {
            return Err(EscrowError::InvariantViolation(format!(
                "escrow {escrow_account} belongs to {} with temp account {}, key store has {} and {temp_token}",
                state.initiator, state.initiator_temp_token_account, alice.pubkey()
            )));
        }
        let escrow_pda: Pubkey = derive_escrow_pda(&alice.pubkey(), state.pda_bump, &ids.escrow)?;

        let cancel_escrow_ix: Instruction = instruction::cancel(
            &ids,
            &CancelAccounts {
                initiator: alice.pubkey(),
                escrow_account,
                initiator_temp_token_account: temp_token,
                initiator_receiving_token_account: alice_usdc,
                escrow_pda
            }
        );

        let balance_before = self.print_balance("Alice before cancelling", &alice_usdc, keystore::USDC).await?;

        let signature: Signature = self.submit(&[cancel_escrow_ix], &[&alice]).await?;

        self.verify_closed(&temp_token, &escrow_account, cancelled).await?;
        self.forget_escrow()?;

        let balance_after = self.print_balance("Alice after cancelling", &alice_usdc, keystore::USDC).await?;

        Ok(CancelOutcome {
            signature,
            escrow_pda,
            balance_before,
            balance_after
        })
    }
}
