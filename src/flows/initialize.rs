use solana_program::{program_pack::Pack, system_instruction};
use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::Signature,
    signer::{Signer, keypair::Keypair}
};
use spl_token::state::Account as TokenAccount;
use super::EscrowClient;
use crate::{
    check_provided_pda,
    find_escrow_pda,
    error::{EscrowError, Result},
    instruction::{self, InitializeAccounts},
    keystore::{self, AddressStore},
    rpc::EscrowRpc,
    state::EscrowState
};


#[derive(Debug)]
pub struct InitializeOutcome {
    pub signature: Signature,
    pub temp_token_account: Pubkey,
    pub escrow_account: Pubkey,
    pub state: EscrowState
}

impl<R: EscrowRpc, S: AddressStore> EscrowClient<R, S> {
    /// Creates a temp token account holding the initiator's offer and a new escrow
    /// account, and initializes the escrow, all in one transaction.
    pub async fn initialize_escrow(&self) -> Result<InitializeOutcome> {
        log::info!("Escrow initialize start");

        // 1. resolve every address before talking to the cluster
        let alice: Keypair = self.store.require_keypair(keystore::ALICE)?;
        let alice_usdc: Pubkey = self.store.require_pubkey(keystore::ALICE_USDC_TOKEN)?;
        let alice_usdt: Pubkey = self.store.require_pubkey(keystore::ALICE_USDT_TOKEN)?;
        let usdc_mint: Pubkey = self.store.require_mint(keystore::USDC)?;

        let ids = self.config.program_ids();
        let temp_token: Keypair = Keypair::new();
        let escrow_account: Keypair = Keypair::new();

        // 2. craft temp token account + transfer + escrow account + init ixs
        log::info!("Building transaction for temp token account {}", temp_token.pubkey());
        let token_rent: u64 = self.rpc.minimum_balance_for_rent_exemption(TokenAccount::LEN).await?;
        let escrow_rent: u64 = self.rpc.minimum_balance_for_rent_exemption(EscrowState::LEN).await?;

        let init_accounts = InitializeAccounts {
            initiator: alice.pubkey(),
            initiator_temp_token_account: temp_token.pubkey(),
            initiator_receiving_token_account: alice_usdt,
            escrow_account: escrow_account.pubkey()
        };
        let initialize_escrow_ix: Instruction = instruction::initialize(
            &ids,
            &init_accounts,
            self.config.initiator_expected_amount
        );

        let instructions: Vec<Instruction> = vec![
            system_instruction::create_account(
                &alice.pubkey(),
                &temp_token.pubkey(),
                token_rent,
                TokenAccount::LEN as u64,
                &ids.token
            ),
            spl_token::instruction::initialize_account(
                &ids.token,
                &temp_token.pubkey(),
                &usdc_mint,
                &alice.pubkey()
            )?,
            spl_token::instruction::transfer_checked(
                &ids.token,
                &alice_usdc,
                &usdc_mint,
                &temp_token.pubkey(),
                &alice.pubkey(),
                &[],
                self.config.counterparty_expected_amount,
                self.config.token_decimals
            )?,
            system_instruction::create_account(
                &alice.pubkey(),
                &escrow_account.pubkey(),
                escrow_rent,
                EscrowState::LEN as u64,
                &ids.escrow
            ),
            initialize_escrow_ix
        ];

        // 3. sign with alice and both new accounts & send it
        let signature: Signature = self
            .submit(&instructions, &[&alice, &temp_token, &escrow_account])
            .await?;

        self.store.put_pubkey(keystore::ALICE_TEMP_TOKEN, &temp_token.pubkey())?;
        self.store.put_pubkey(keystore::ESCROW_ACCOUNT, &escrow_account.pubkey())?;

        // 4. read back what the program wrote
        let data = self.rpc
            .account_data(&escrow_account.pubkey())
            .await?
            .ok_or(EscrowError::AccountNotFound(escrow_account.pubkey()))?;
        let state: EscrowState = EscrowState::decode_initialized(&data)?;

        log::info!("Escrow is_initialized: {}", state.is_initialized);
        log::info!("Escrow initiator: {}", state.initiator);
        log::info!("Escrow initiator temp token account: {}", state.initiator_temp_token_account);
        log::info!("Escrow initiator receiving token account: {}", state.initiator_receiving_token_account);
        log::info!("Escrow expected amount: {}", state.expected_amount);
        log::info!("Escrow PDA bump: {}", state.pda_bump);

        check_initialized_state(&state, &init_accounts, self.config.initiator_expected_amount)?;
        let (escrow_pda, _) = find_escrow_pda(&state.initiator, &ids.escrow);
        check_provided_pda(&state.initiator, &escrow_pda, state.pda_bump, &ids.escrow)?;
        log::info!("Escrow PDA: {}", escrow_pda);

        Ok(InitializeOutcome {
            signature,
            temp_token_account: temp_token.pubkey(),
            escrow_account: escrow_account.pubkey(),
            state
        })
    }
}

fn check_initialized_state(state: &EscrowState, accounts: &InitializeAccounts, expected_amount: u64) -> Result<()> {
    let mismatch = |field: &str, found: String, expected: String| {
        EscrowError::InvariantViolation(format!("escrow {field} is {found}, expected {expected}"))
    };

    if state.initiator != accounts.initiator {
        return Err(mismatch("initiator", state.initiator.to_string(), accounts.initiator.to_string()));
    }
    if state.initiator_temp_token_account != accounts.initiator_temp_token_account {
        return Err(mismatch(
            "temp token account",
            state.initiator_temp_token_account.to_string(),
            accounts.initiator_temp_token_account.to_string()
        ));
    }
    if state.initiator_receiving_token_account != accounts.initiator_receiving_token_account {
        return Err(mismatch(
            "receiving token account",
            state.initiator_receiving_token_account.to_string(),
            accounts.initiator_receiving_token_account.to_string()
        ));
    }
    if state.expected_amount != expected_amount {
        return Err(mismatch("expected amount", state.expected_amount.to_string(), expected_amount.to_string()));
    }

    Ok(())
}
