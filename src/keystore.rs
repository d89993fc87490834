//! Nickname keyed store of keypairs, public keys and mint addresses.
//!
//! The file layout matches the one the setup scripts have always used:
//!
//! ```text
//! keys/<nickname>/publicKey.json    "base58 pubkey"
//! keys/<nickname>/privateKey.json   [64 bytes]
//! keys/mints/<mint>_pub.json        "base58 pubkey"
//! ```

use solana_sdk::{
    pubkey::Pubkey,
    signer::{
        Signer,
        keypair::{read_keypair_file, write_keypair_file, Keypair}
    }
};
use std::{
    collections::HashMap,
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Mutex
};
use crate::error::{EscrowError, Result};


pub const ALICE: &str = "alice";
pub const BOB: &str = "bob";
pub const MASTER_ACCOUNT: &str = "masterAccount";
pub const ALICE_USDC_TOKEN: &str = "aliceUSDCToken";
pub const ALICE_USDT_TOKEN: &str = "aliceUSDTToken";
pub const BOB_USDC_TOKEN: &str = "bobUSDCToken";
pub const BOB_USDT_TOKEN: &str = "bobUSDTToken";
pub const ALICE_TEMP_TOKEN: &str = "aliceTempToken";
pub const ESCROW_ACCOUNT: &str = "escrowAccount";
pub const USDC: &str = "USDC";
pub const USDT: &str = "USDT";

pub trait AddressStore {
    fn pubkey(&self, nickname: &str) -> Result<Option<Pubkey>>;

    fn keypair(&self, nickname: &str) -> Result<Option<Keypair>>;

    fn put_pubkey(&self, nickname: &str, pubkey: &Pubkey) -> Result<()>;

    /// Stores both halves of `keypair`.
    fn put_keypair(&self, nickname: &str, keypair: &Keypair) -> Result<()>;

    /// Forgets `nickname`. Removing an unknown nickname is not an error.
    fn remove(&self, nickname: &str) -> Result<()>;

    fn mint(&self, name: &str) -> Result<Option<Pubkey>>;

    fn put_mint(&self, name: &str, mint: &Pubkey) -> Result<()>;

    fn require_pubkey(&self, nickname: &str) -> Result<Pubkey> {
        self.pubkey(nickname)?
            .ok_or_else(|| EscrowError::MissingAddress(nickname.to_string()))
    }

    fn require_keypair(&self, nickname: &str) -> Result<Keypair> {
        self.keypair(nickname)?
            .ok_or_else(|| EscrowError::MissingAddress(nickname.to_string()))
    }

    fn require_mint(&self, name: &str) -> Result<Pubkey> {
        self.mint(name)?
            .ok_or_else(|| EscrowError::MissingAddress(format!("{name} mint")))
    }
}

pub struct FileKeyStore {
    root: PathBuf
}

impl FileKeyStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn public_key_path(&self, nickname: &str) -> PathBuf {
        self.root.join(nickname).join("publicKey.json")
    }

    fn private_key_path(&self, nickname: &str) -> PathBuf {
        self.root.join(nickname).join("privateKey.json")
    }

    fn mint_path(&self, name: &str) -> PathBuf {
        self.root.join("mints").join(format!("{}_pub.json", name.to_lowercase()))
    }

    fn read_pubkey_file(path: &Path) -> Result<Option<Pubkey>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into())
        };

        let encoded: String = serde_json::from_str(&contents)?;
        let pubkey = Pubkey::from_str(&encoded).map_err(|e| {
            io::Error::new(ErrorKind::InvalidData, format!("{}: {e}", path.display()))
        })?;
        Ok(Some(pubkey))
    }

    fn write_pubkey_file(path: &Path, pubkey: &Pubkey) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string(&pubkey.to_string())?)?;
        Ok(())
    }
}

impl AddressStore for FileKeyStore {
    fn pubkey(&self, nickname: &str) -> Result<Option<Pubkey>> {
        Self::read_pubkey_file(&self.public_key_path(nickname))
    }

    fn keypair(&self, nickname: &str) -> Result<Option<Keypair>> {
        let path = self.private_key_path(nickname);
        if !path.exists() {
            return Ok(None);
        }

        let keypair = read_keypair_file(&path).map_err(|e| {
            io::Error::new(ErrorKind::InvalidData, format!("{}: {e}", path.display()))
        })?;
        Ok(Some(keypair))
    }

    fn put_pubkey(&self, nickname: &str, pubkey: &Pubkey) -> Result<()> {
        Self::write_pubkey_file(&self.public_key_path(nickname), pubkey)
    }

    fn put_keypair(&self, nickname: &str, keypair: &Keypair) -> Result<()> {
        self.put_pubkey(nickname, &keypair.pubkey())?;
        write_keypair_file(keypair, self.private_key_path(nickname))
            .map_err(|e| io::Error::other(e.to_string()))?;
        Ok(())
    }

    fn remove(&self, nickname: &str) -> Result<()> {
        match fs::remove_dir_all(self.root.join(nickname)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(())
        }
    }

    fn mint(&self, name: &str) -> Result<Option<Pubkey>> {
        Self::read_pubkey_file(&self.mint_path(name))
    }

    fn put_mint(&self, name: &str, mint: &Pubkey) -> Result<()> {
        Self::write_pubkey_file(&self.mint_path(name), mint)
    }
}

#[derive(Default)]
struct MemoryEntries {
    pubkeys: HashMap<String, Pubkey>,
    keypairs: HashMap<String, Keypair>,
    mints: HashMap<String, Pubkey>
}

/// In-process store, used by tests and dry runs.
#[derive(Default)]
pub struct MemoryKeyStore {
    entries: Mutex<MemoryEntries>
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, nickname: &str) -> bool {
        self.lock().pubkeys.contains_key(nickname)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryEntries> {
        // a poisoned lock only means a test panicked while holding it
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AddressStore for MemoryKeyStore {
    fn pubkey(&self, nickname: &str) -> Result<Option<Pubkey>> {
        Ok(self.lock().pubkeys.get(nickname).copied())
    }

    fn keypair(&self, nickname: &str) -> Result<Option<Keypair>> {
        Ok(self.lock().keypairs.get(nickname).map(Keypair::insecure_clone))
    }

    fn put_pubkey(&self, nickname: &str, pubkey: &Pubkey) -> Result<()> {
        self.lock().pubkeys.insert(nickname.to_string(), *pubkey);
        Ok(())
    }

    fn put_keypair(&self, nickname: &str, keypair: &Keypair) -> Result<()> {
        let mut entries = self.lock();
        entries.pubkeys.insert(nickname.to_string(), keypair.pubkey());
        entries.keypairs.insert(nickname.to_string(), keypair.insecure_clone());
        Ok(())
    }

    fn remove(&self, nickname: &str) -> Result<()> {
        let mut entries = self.lock();
        entries.pubkeys.remove(nickname);
        entries.keypairs.remove(nickname);
        Ok(())
    }

    fn mint(&self, name: &str) -> Result<Option<Pubkey>> {
        Ok(self.lock().mints.get(&name.to_lowercase()).copied())
    }

    fn put_mint(&self, name: &str, mint: &Pubkey) -> Result<()> {
        self.lock().mints.insert(name.to_lowercase(), *mint);
        Ok(())
    }
}
