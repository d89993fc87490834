#![allow(dead_code)]

use escrow_client::{
    config::{Config, ConfirmationConfig},
    error::{EscrowError, Result},
    find_escrow_pda,
    instruction::EscrowInstruction,
    keystore::{self, AddressStore, MemoryKeyStore},
    rpc::{EscrowRpc, TokenBalance},
    state::EscrowState,
    EscrowClient
};
use solana_rpc_client_api::client_error::{Error as ClientError, ErrorKind as ClientErrorKind};
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    signer::{Signer, keypair::Keypair},
    transaction::Transaction
};
use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex
};

pub type Accounts = HashMap<Pubkey, Vec<u8>>;
type Program = Box<dyn Fn(&Transaction, &mut Accounts) + Send + Sync>;

#[derive(Default)]
struct MockState {
    accounts: Accounts,
    lamports: HashMap<Pubkey, u64>,
    token_amounts: HashMap<Pubkey, u64>,
    statuses: VecDeque<Option<std::result::Result<(), String>>>,
    sent: Vec<Transaction>,
    airdrops: Vec<(Pubkey, u64)>,
    calls: usize,
    fail_send: Option<String>,
    fail_balances_after_send: bool
}

/// In-memory cluster: accounts are byte blobs and `program` plays the part of
/// whatever on-chain programs a sent transaction would run.
pub struct MockRpc {
    state: Mutex<MockState>,
    program: Program
}

impl MockRpc {
    /// A cluster whose programs never change any account.
    pub fn inert() -> Self {
        Self::with_program(|_, _| {})
    }

    pub fn with_program(program: impl Fn(&Transaction, &mut Accounts) + Send + Sync + 'static) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            program: Box::new(program)
        }
    }

    pub fn set_account(&self, pubkey: Pubkey, data: Vec<u8>) {
        self.state.lock().unwrap().accounts.insert(pubkey, data);
    }

    pub fn has_account(&self, pubkey: &Pubkey) -> bool {
        self.state.lock().unwrap().accounts.contains_key(pubkey)
    }

    pub fn set_token_amount(&self, pubkey: Pubkey, amount: u64) {
        self.state.lock().unwrap().token_amounts.insert(pubkey, amount);
    }

    pub fn set_lamports(&self, pubkey: Pubkey, lamports: u64) {
        self.state.lock().unwrap().lamports.insert(pubkey, lamports);
    }

    /// Statuses returned by successive `signature_status` polls; once drained every
    /// signature is reported as confirmed.
    pub fn push_statuses(&self, statuses: impl IntoIterator<Item = Option<std::result::Result<(), String>>>) {
        self.state.lock().unwrap().statuses.extend(statuses);
    }

    pub fn fail_sends(&self, reason: &str) {
        self.state.lock().unwrap().fail_send = Some(reason.to_string());
    }

    /// Token balance reads fail once any transaction has been sent.
    pub fn fail_balances_after_send(&self) {
        self.state.lock().unwrap().fail_balances_after_send = true;
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    pub fn sent(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn airdrops(&self) -> Vec<(Pubkey, u64)> {
        self.state.lock().unwrap().airdrops.clone()
    }

    fn call(&self) -> std::sync::MutexGuard<'_, MockState> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        state
    }
}

impl EscrowRpc for MockRpc {
    async fn account_data(&self, pubkey: &Pubkey) -> Result<Option<Vec<u8>>> {
        Ok(self.call().accounts.get(pubkey).cloned())
    }

    async fn latest_blockhash(&self) -> Result<Hash> {
        self.call();
        Ok(Hash::new_from_array([3; 32]))
    }

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64> {
        self.call();
        Ok(890_880 + data_len as u64 * 6_960)
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<Signature> {
        let mut state = self.call();
        if let Some(reason) = state.fail_send.clone() {
            return Err(ClientError::from(ClientErrorKind::Custom(reason)).into());
        }

        (self.program)(tx, &mut state.accounts);
        state.sent.push(tx.clone());
        Ok(tx.signatures[0])
    }

    async fn signature_status(&self, _signature: &Signature) -> Result<Option<std::result::Result<(), String>>> {
        Ok(self.call().statuses.pop_front().unwrap_or(Some(Ok(()))))
    }

    async fn token_account_balance(&self, pubkey: &Pubkey) -> Result<TokenBalance> {
        let state = self.call();
        if state.fail_balances_after_send && !state.sent.is_empty() {
            return Err(ClientError::from(ClientErrorKind::Custom(format!("no token account {pubkey}"))).into());
        }
        let amount = state.token_amounts.get(pubkey).copied().unwrap_or_default();
        Ok(TokenBalance {
            amount,
            decimals: 6,
            ui_amount: format!("{}", amount as f64 / 1e6)
        })
    }

    async fn balance(&self, pubkey: &Pubkey) -> Result<u64> {
        Ok(self.call().lamports.get(pubkey).copied().unwrap_or_default())
    }

    async fn request_airdrop(&self, pubkey: &Pubkey, lamports: u64) -> Result<Signature> {
        let mut state = self.call();
        state.airdrops.push((*pubkey, lamports));
        *state.lamports.entry(*pubkey).or_default() += lamports;
        Ok(Signature::from([lamports.to_le_bytes()[0]; 64]))
    }
}

/// Emulates the escrow program: initialize writes the record and the temp
/// account, exchange and cancel close both accounts.
pub fn escrow_program(program_id: Pubkey) -> impl Fn(&Transaction, &mut Accounts) + Send + Sync + 'static {
    move |tx: &Transaction, accounts: &mut Accounts| {
        let message = &tx.message;
        for ix in &message.instructions {
            if message.account_keys[ix.program_id_index as usize] != program_id {
                continue;
            }
            let key = |position: usize| message.account_keys[ix.accounts[position] as usize];

            match EscrowInstruction::unpack(&ix.data).unwrap() {
                EscrowInstruction::Initialize { expected_amount } => {
                    let initiator = key(0);
                    let state = EscrowState {
                        is_initialized: true,
                        initiator,
                        initiator_temp_token_account: key(1),
                        initiator_receiving_token_account: key(2),
                        expected_amount,
                        pda_bump: find_escrow_pda(&initiator, &program_id).1
                    };
                    accounts.insert(key(1), vec![0; 165]);
                    accounts.insert(key(3), state.encode().to_vec());
                },
                EscrowInstruction::Exchange { .. } => {
                    accounts.remove(&key(3));
                    accounts.remove(&key(6));
                },
                EscrowInstruction::Cancel => {
                    accounts.remove(&key(1));
                    accounts.remove(&key(2));
                }
            }
        }
    }
}

pub fn test_config() -> Config {
    Config {
        confirmation: ConfirmationConfig {
            timeout_ms: 1_000,
            initial_backoff_ms: 10,
            max_backoff_ms: 40
        },
        ..Config::default_localhost()
    }
}

/// Key store as left behind by `store` + `setup`.
pub struct Parties {
    pub alice: Keypair,
    pub bob: Keypair,
    pub alice_usdc: Pubkey,
    pub alice_usdt: Pubkey,
    pub bob_usdc: Pubkey,
    pub bob_usdt: Pubkey,
    pub usdc_mint: Pubkey
}

impl Parties {
    pub fn new() -> Self {
        Self {
            alice: Keypair::new(),
            bob: Keypair::new(),
            alice_usdc: Pubkey::new_unique(),
            alice_usdt: Pubkey::new_unique(),
            bob_usdc: Pubkey::new_unique(),
            bob_usdt: Pubkey::new_unique(),
            usdc_mint: Pubkey::new_unique()
        }
    }

    pub fn store(&self) -> MemoryKeyStore {
        let store = MemoryKeyStore::new();
        store.put_keypair(keystore::ALICE, &self.alice).unwrap();
        store.put_keypair(keystore::BOB, &self.bob).unwrap();
        store.put_pubkey(keystore::ALICE_USDC_TOKEN, &self.alice_usdc).unwrap();
        store.put_pubkey(keystore::ALICE_USDT_TOKEN, &self.alice_usdt).unwrap();
        store.put_pubkey(keystore::BOB_USDC_TOKEN, &self.bob_usdc).unwrap();
        store.put_pubkey(keystore::BOB_USDT_TOKEN, &self.bob_usdt).unwrap();
        store.put_mint(keystore::USDC, &self.usdc_mint).unwrap();
        store
    }

    /// Seeds `rpc` and `store` with an escrow initialized by alice.
    pub fn open_escrow(&self, rpc: &MockRpc, store: &MemoryKeyStore, program_id: &Pubkey) -> (Pubkey, Pubkey, EscrowState) {
        let escrow_account = Pubkey::new_unique();
        let temp_token = Pubkey::new_unique();
        let state = EscrowState {
            is_initialized: true,
            initiator: self.alice.pubkey(),
            initiator_temp_token_account: temp_token,
            initiator_receiving_token_account: self.alice_usdt,
            expected_amount: 10_000_000,
            pda_bump: find_escrow_pda(&self.alice.pubkey(), program_id).1
        };

        rpc.set_account(escrow_account, state.encode().to_vec());
        rpc.set_account(temp_token, vec![0; 165]);
        store.put_pubkey(keystore::ESCROW_ACCOUNT, &escrow_account).unwrap();
        store.put_pubkey(keystore::ALICE_TEMP_TOKEN, &temp_token).unwrap();

        (escrow_account, temp_token, state)
    }
}

pub fn client(rpc: MockRpc, store: MemoryKeyStore) -> EscrowClient<MockRpc, MemoryKeyStore> {
    EscrowClient::new(test_config(), rpc, store)
}

pub fn is_invariant_violation(err: &EscrowError) -> bool {
    matches!(err, EscrowError::InvariantViolation(_))
}
