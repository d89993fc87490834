use solana_sdk::{
    pubkey::Pubkey,
    signer::{Signer, keypair::Keypair}
};
use super::EscrowClient;
use crate::{
    error::Result,
    keystore::{self, AddressStore},
    rpc::EscrowRpc
};


impl<R: EscrowRpc, S: AddressStore> EscrowClient<R, S> {
    /// Generates the alice, bob and master keypairs. Keypairs already in the
    /// store are kept so a second run does not orphan funded accounts.
    pub fn store_keypairs(&self) -> Result<Vec<(String, Pubkey)>> {
        let mut stored = Vec::with_capacity(3);

        for nickname in [keystore::ALICE, keystore::BOB, keystore::MASTER_ACCOUNT] {
            let pubkey: Pubkey = match self.store.keypair(nickname)? {
                Some(existing) => {
                    log::info!("Keypair {} exists: {}", nickname, existing.pubkey());
                    existing.pubkey()
                },
                None => {
                    let keypair: Keypair = Keypair::new();
                    self.store.put_keypair(nickname, &keypair)?;
                    log::info!("Keypair {} created: {}", nickname, keypair.pubkey());
                    keypair.pubkey()
                }
            };
            stored.push((nickname.to_string(), pubkey));
        }

        Ok(stored)
    }
}
