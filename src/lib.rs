pub mod config;
pub mod error;
pub mod flows;
pub mod instruction;
pub mod keystore;
pub mod rpc;
pub mod state;

use solana_program::pubkey::Pubkey;
use error::{EscrowError, Result};

pub use config::{Config, ProgramIds};
pub use flows::EscrowClient;

pub const ESCROW_SEED: &[u8] = b"escrow";

pub fn get_escrow_seeds(initiator_pkey: &Pubkey) -> (&[u8], &[u8]) {
    (
        ESCROW_SEED,
        initiator_pkey.as_ref()
    )
}

/// Recomputes the escrow PDA from the bump stored in the escrow account.
pub fn derive_escrow_pda(initiator_pkey: &Pubkey, bump: u8, program_id: &Pubkey) -> Result<Pubkey> {
    let (seed1, seed2) = get_escrow_seeds(initiator_pkey);
    Pubkey::create_program_address(&[seed1, seed2, &[bump]], program_id)
        .map_err(|_| EscrowError::InvalidPda { initiator: *initiator_pkey, bump })
}

/// Searches the canonical bump, the way the program does when it initializes an escrow.
pub fn find_escrow_pda(initiator_pkey: &Pubkey, program_id: &Pubkey) -> (Pubkey, u8) {
    let (seed1, seed2) = get_escrow_seeds(initiator_pkey);
    Pubkey::find_program_address(&[seed1, seed2], program_id)
}

pub fn check_provided_pda(
    initiator_pkey: &Pubkey,
    escrow_pda: &Pubkey,
    bump: u8,
    program_id: &Pubkey
) -> Result<()> {
    let expected_pda: Pubkey = derive_escrow_pda(initiator_pkey, bump, program_id)?;

    if escrow_pda != &expected_pda {
        return Err(EscrowError::InvariantViolation(format!(
            "escrow PDA {escrow_pda} does not match {expected_pda} derived from initiator {initiator_pkey}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program_id() -> Pubkey {
        config::DEFAULT_ESCROW_PROGRAM
    }

    #[test]
    fn pda_derivation_is_deterministic() {
        let initiator: Pubkey = Pubkey::new_from_array([42; 32]);
        let (pda, bump) = find_escrow_pda(&initiator, &program_id());

        for _ in 0..3 {
            assert_eq!(derive_escrow_pda(&initiator, bump, &program_id()).unwrap(), pda);
            assert_eq!(find_escrow_pda(&initiator, &program_id()), (pda, bump));
        }
    }

    #[test]
    fn pda_depends_on_initiator_and_program() {
        let alice: Pubkey = Pubkey::new_unique();
        let bob: Pubkey = Pubkey::new_unique();

        let (alice_pda, _) = find_escrow_pda(&alice, &program_id());
        let (bob_pda, _) = find_escrow_pda(&bob, &program_id());
        let (other_program_pda, _) = find_escrow_pda(&alice, &Pubkey::new_unique());

        assert_ne!(alice_pda, bob_pda);
        assert_ne!(alice_pda, other_program_pda);
    }

    #[test]
    fn provided_pda_is_checked() {
        let initiator: Pubkey = Pubkey::new_unique();
        let (pda, bump) = find_escrow_pda(&initiator, &program_id());

        check_provided_pda(&initiator, &pda, bump, &program_id()).unwrap();

        let err = check_provided_pda(&initiator, &Pubkey::new_unique(), bump, &program_id()).unwrap_err();
        assert!(matches!(err, EscrowError::InvariantViolation(_)));
    }
}
