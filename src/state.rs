use solana_program::{
    program_error::ProgramError,
    program_pack::{IsInitialized, Pack, Sealed},
    pubkey::{Pubkey, PUBKEY_BYTES}
};
use crate::error::{EscrowError, Result};


/// Escrow state record written by the on-chain program.
///
/// Layout (106 bytes, no padding):
///
/// * `[0]`       is_initialized
/// * `[1..33]`   initiator
/// * `[33..65]`  initiator temp token account
/// * `[65..97]`  initiator receiving token account
/// * `[97..105]` expected amount (u64, little-endian)
/// * `[105]`     PDA bump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowState {
    pub is_initialized: bool,
    pub initiator: Pubkey,
    pub initiator_temp_token_account: Pubkey,
    pub initiator_receiving_token_account: Pubkey,
    pub expected_amount: u64,
    pub pda_bump: u8
}

impl EscrowState {
    /// Decodes a raw account buffer. The buffer must be exactly [`EscrowState::LEN`] bytes.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() != Self::LEN {
            return Err(EscrowError::Layout { expected: Self::LEN, actual: src.len() });
        }

        let (flag, rest) = src.split_at(1);
        let is_initialized = match flag[0] {
            0 => false,
            1 => true,
            other => return Err(EscrowError::InvalidFlag(other))
        };

        let (initiator, rest) = rest.split_at(PUBKEY_BYTES);
        let (temp, rest) = rest.split_at(PUBKEY_BYTES);
        let (receiving, rest) = rest.split_at(PUBKEY_BYTES);
        let (amount, bump) = rest.split_at(8);

        Ok(Self {
            is_initialized,
            initiator: read_pubkey(initiator)?,
            initiator_temp_token_account: read_pubkey(temp)?,
            initiator_receiving_token_account: read_pubkey(receiving)?,
            expected_amount: crate::instruction::decode_amount(amount)?,
            pda_bump: bump[0]
        })
    }

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut dst = [0u8; Self::LEN];
        self.pack_into_slice(&mut dst);
        dst
    }

    /// Decodes `src` and rejects records the program has not initialized yet.
    pub fn decode_initialized(src: &[u8]) -> Result<Self> {
        let state = Self::decode(src)?;
        if !state.is_initialized {
            return Err(EscrowError::InvariantViolation(
                "escrow account is not initialized".to_string()
            ));
        }
        Ok(state)
    }
}

fn read_pubkey(bytes: &[u8]) -> Result<Pubkey> {
    let raw: [u8; PUBKEY_BYTES] = bytes
        .try_into()
        .map_err(|_| EscrowError::Layout { expected: PUBKEY_BYTES, actual: bytes.len() })?;
    Ok(Pubkey::new_from_array(raw))
}

impl IsInitialized for EscrowState {
    fn is_initialized(&self) -> bool {
        self.is_initialized
    }
}

impl Sealed for EscrowState {}

impl Pack for EscrowState {
    const LEN: usize = 1 + PUBKEY_BYTES * 3 + 8 + 1;

    fn pack_into_slice(&self, dst: &mut [u8]) {
        let (flag, rest) = dst.split_at_mut(1);
        let (initiator, rest) = rest.split_at_mut(PUBKEY_BYTES);
        let (temp, rest) = rest.split_at_mut(PUBKEY_BYTES);
        let (receiving, rest) = rest.split_at_mut(PUBKEY_BYTES);
        let (amount, bump) = rest.split_at_mut(8);

        flag[0] = self.is_initialized as u8;
        initiator.copy_from_slice(self.initiator.as_ref());
        temp.copy_from_slice(self.initiator_temp_token_account.as_ref());
        receiving.copy_from_slice(self.initiator_receiving_token_account.as_ref());
        amount.copy_from_slice(&self.expected_amount.to_le_bytes());
        bump[0] = self.pda_bump;
    }

    // Pack::unpack already checks the length before calling this.
    fn unpack_from_slice(src: &[u8]) -> std::result::Result<Self, ProgramError> {
        Self::decode(src).map_err(|_| ProgramError::InvalidAccountData)
    }
}

/// Lifecycle of an escrow as driven by the on-chain program.
///
/// This crate never performs the transitions itself; it uses the phase to
/// decide whether an operation is legal before submitting it and to check
/// what it observes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowPhase {
    Uninitialized,
    Initialized(EscrowState),
    Settled,
    Cancelled
}

/// The three operations the escrow program accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowOperation {
    Initialize,
    Exchange,
    Cancel
}

impl EscrowPhase {
    /// Phase implied by a freshly fetched escrow account.
    ///
    /// An absent account is reported as `closed`; the caller knows whether it
    /// was closed by an exchange or a cancel.
    pub fn observe(data: Option<&[u8]>, closed: EscrowPhase) -> Result<Self> {
        match data {
            None => Ok(closed),
            Some(bytes) => {
                let state = EscrowState::decode(bytes)?;
                Ok(if state.is_initialized { Self::Initialized(state) } else { Self::Uninitialized })
            }
        }
    }

    pub fn apply(self, operation: EscrowOperation) -> Result<Self> {
        match (self, operation) {
            (Self::Uninitialized, EscrowOperation::Initialize) => Ok(self),
            (Self::Initialized(_), EscrowOperation::Exchange) => Ok(Self::Settled),
            (Self::Initialized(_), EscrowOperation::Cancel) => Ok(Self::Cancelled),
            (phase, op) => Err(EscrowError::InvariantViolation(
                format!("{op:?} is not allowed while the escrow is {}", phase.name())
            ))
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Settled | Self::Cancelled)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized(_) => "initialized",
            Self::Settled => "settled",
            Self::Cancelled => "cancelled"
        }
    }
}
