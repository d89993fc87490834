use solana_program::{program_pack::Pack, system_instruction};
use solana_sdk::{
    instruction::Instruction,
    native_token::LAMPORTS_PER_SOL,
    pubkey::Pubkey,
    signature::Signature,
    signer::{Signer, keypair::Keypair}
};
use spl_associated_token_account::{
    get_associated_token_address_with_program_id,
    instruction::create_associated_token_account_idempotent
};
use spl_token::state::Mint;
use super::EscrowClient;
use crate::{
    error::{EscrowError, Result},
    instruction::to_base_units,
    keystore::{self, AddressStore},
    rpc::{self, EscrowRpc}
};


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupOutcome {
    pub usdc_mint: Pubkey,
    pub usdt_mint: Pubkey,
    /// (nickname, token account) for both parties and both mints
    pub token_accounts: Vec<(String, Pubkey)>
}

impl<R: EscrowRpc, S: AddressStore> EscrowClient<R, S> {
    /// Funds both parties, creates the USDC and USDT test mints, gives each party an
    /// associated token account per mint and mints test tokens into all of them.
    pub async fn setup(&self) -> Result<SetupOutcome> {
        let alice: Pubkey = self.store.require_pubkey(keystore::ALICE)?;
        let bob: Pubkey = self.store.require_pubkey(keystore::BOB)?;
        let master: Keypair = self.store.require_keypair(keystore::MASTER_ACCOUNT)?;

        log::info!("Addresses: master account {}", master.pubkey());
        log::info!("Addresses: alice {}", alice);
        log::info!("Addresses: bob {}", bob);

        // 1. fund everyone that pays fees
        for pubkey in [alice, bob, master.pubkey()] {
            self.topup_account(&pubkey).await?;
        }

        // 2. mints
        let usdc_mint: Pubkey = self.ensure_mint(&master, keystore::USDC).await?;
        let usdt_mint: Pubkey = self.ensure_mint(&master, keystore::USDT).await?;

        // 3. associated token accounts, paid for by the master account
        let token_program: Pubkey = self.config.token_program_id;
        let layout = [
            (keystore::ALICE_USDC_TOKEN, alice, usdc_mint),
            (keystore::ALICE_USDT_TOKEN, alice, usdt_mint),
            (keystore::BOB_USDC_TOKEN, bob, usdc_mint),
            (keystore::BOB_USDT_TOKEN, bob, usdt_mint)
        ];

        let mut create_ixs: Vec<Instruction> = Vec::with_capacity(layout.len());
        let mut token_accounts: Vec<(String, Pubkey)> = Vec::with_capacity(layout.len());
        for (nickname, owner, mint) in layout {
            let address = get_associated_token_address_with_program_id(&owner, &mint, &token_program);
            create_ixs.push(create_associated_token_account_idempotent(
                &master.pubkey(),
                &owner,
                &mint,
                &token_program
            ));
            token_accounts.push((nickname.to_string(), address));
        }

        log::info!("Creating associated token accounts");
        self.submit(&create_ixs, &[&master]).await?;
        for (nickname, address) in &token_accounts {
            self.store.put_pubkey(nickname, address)?;
            log::info!("{}: {}", nickname, address);
        }

        // 4. mint test tokens
        let amount: u64 = to_base_units(self.config.mint_ui_amount, self.config.token_decimals)?;
        let mut mint_ixs: Vec<Instruction> = Vec::with_capacity(layout.len());
        for ((_, _, mint), (_, address)) in layout.iter().zip(&token_accounts) {
            mint_ixs.push(spl_token::instruction::mint_to(
                &token_program,
                mint,
                address,
                &master.pubkey(),
                &[],
                amount
            )?);
        }

        log::info!("Minting {} USDC and USDT to alice and bob", self.config.mint_ui_amount);
        self.submit(&mint_ixs, &[&master]).await?;

        log::info!("Final balances");
        for ((nickname, address), (_, _, mint)) in token_accounts.iter().zip(layout.iter()) {
            let token = if *mint == usdc_mint { keystore::USDC } else { keystore::USDT };
            self.print_balance(nickname, address, token).await?;
        }

        log::info!("Setup complete");
        Ok(SetupOutcome { usdc_mint, usdt_mint, token_accounts })
    }

    /// Airdrops `airdrop_sol` to an account with an empty balance.
    async fn topup_account(&self, pubkey: &Pubkey) -> Result<Option<Signature>> {
        let balance: u64 = self.rpc.balance(pubkey).await?;
        log::info!("Balance of {}: {} SOL", pubkey, balance as f64 / LAMPORTS_PER_SOL as f64);
        if balance > 0 {
            return Ok(None);
        }

        let lamports: u64 = self.config.airdrop_sol
            .checked_mul(LAMPORTS_PER_SOL)
            .ok_or_else(|| EscrowError::Encoding(format!("{} SOL overflows u64 lamports", self.config.airdrop_sol)))?;

        log::info!("Sending airdrop to {}", pubkey);
        let signature: Signature = self.rpc.request_airdrop(pubkey, lamports).await?;
        rpc::wait_for_confirmation(&self.rpc, &signature, &self.config.confirmation).await?;
        log::info!("Received airdrop.");
        Ok(Some(signature))
    }

    /// Returns the stored mint called `name`, creating it when the store has none.
    async fn ensure_mint(&self, authority: &Keypair, name: &str) -> Result<Pubkey> {
        if let Some(existing) = self.store.mint(name)? {
            log::info!("Exists: {} mint {}", name, existing);
            return Ok(existing);
        }

        log::info!("Creating {} mint", name);
        let mint: Keypair = Keypair::new();
        let token_program: Pubkey = self.config.token_program_id;
        let rent: u64 = self.rpc.minimum_balance_for_rent_exemption(Mint::LEN).await?;

        let instructions: Vec<Instruction> = vec![
            system_instruction::create_account(
                &authority.pubkey(),
                &mint.pubkey(),
                rent,
                Mint::LEN as u64,
                &token_program
            ),
            spl_token::instruction::initialize_mint(
                &token_program,
                &mint.pubkey(),
                &authority.pubkey(),
                None,
                self.config.token_decimals
            )?
        ];
        self.submit(&instructions, &[authority, &mint]).await?;

        self.store.put_mint(name, &mint.pubkey())?;
        log::info!("New: {} mint {}", name, mint.pubkey());
        Ok(mint.pubkey())
    }
}
