use solana_program::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey
};
use crate::{
    ProgramIds,
    error::{EscrowError, Result}
};


pub const INITIALIZE_OPCODE: u8 = 0;
pub const EXCHANGE_OPCODE: u8 = 1;
pub const CANCEL_OPCODE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowInstruction {
    /// Starts the trade: populates the escrow account and hands the temp token
    /// account over to the escrow PDA.
    ///
    /// Accounts expected:
    ///
    /// 0. `[signer]` initiator
    /// 1. `[writable]` initiator temp token account
    /// 2. `[]` initiator receiving token account
    /// 3. `[writable]` escrow account, created in the same transaction
    /// 4. `[]` token program
    Initialize { expected_amount: u64 },

    /// Accepts the trade.
    ///
    /// Accounts expected:
    ///
    /// 0. `[signer]` counterparty
    /// 1. `[writable]` counterparty send token account
    /// 2. `[writable]` counterparty receive token account
    /// 3. `[writable]` initiator temp token account
    /// 4. `[writable]` initiator, receives the rent of the closed accounts
    /// 5. `[writable]` initiator receiving token account
    /// 6. `[writable]` escrow account
    /// 7. `[]` token program
    /// 8. `[]` escrow PDA
    Exchange { amount: u64 },

    /// Cancels the trade and returns the escrowed tokens.
    ///
    /// Accounts expected:
    ///
    /// 0. `[signer]` initiator
    /// 1. `[writable]` escrow account
    /// 2. `[writable]` initiator temp token account
    /// 3. `[writable]` initiator token account the funds return to
    /// 4. `[]` token program
    /// 5. `[]` escrow PDA
    Cancel
}

impl EscrowInstruction {
    pub fn opcode(&self) -> u8 {
        match self {
            Self::Initialize { .. } => INITIALIZE_OPCODE,
            Self::Exchange { .. } => EXCHANGE_OPCODE,
            Self::Cancel => CANCEL_OPCODE
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut data: Vec<u8> = Vec::with_capacity(9);
        data.push(self.opcode());
        match self {
            Self::Initialize { expected_amount: amount } | Self::Exchange { amount } => {
                data.extend_from_slice(&amount.to_le_bytes());
            },
            Self::Cancel => {}
        }
        data
    }

    pub fn unpack(data: &[u8]) -> Result<Self> {
        let (opcode, rest) = data
            .split_first()
            .ok_or_else(|| EscrowError::Encoding("empty instruction data".to_string()))?;

        Ok(match *opcode {
            INITIALIZE_OPCODE => Self::Initialize { expected_amount: decode_amount(rest)? },
            EXCHANGE_OPCODE => Self::Exchange { amount: decode_amount(rest)? },
            CANCEL_OPCODE if rest.is_empty() => Self::Cancel,
            CANCEL_OPCODE => return Err(EscrowError::Encoding("cancel takes no payload".to_string())),
            other => return Err(EscrowError::Encoding(format!("unknown opcode {other}")))
        })
    }
}

/// Encodes an amount as the 8-byte little-endian integer the program expects.
pub fn encode_amount(amount: u128) -> Result<[u8; 8]> {
    let amount: u64 = amount
        .try_into()
        .map_err(|_| EscrowError::Encoding(format!("amount {amount} does not fit in u64")))?;
    Ok(amount.to_le_bytes())
}

pub fn decode_amount(data: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = data
        .try_into()
        .map_err(|_| EscrowError::Encoding(format!("amount must be 8 bytes, got {}", data.len())))?;
    Ok(u64::from_le_bytes(raw))
}

/// Scales a whole-token amount to base units, e.g. `10` USDT with 6 decimals to `10_000_000`.
pub fn to_base_units(ui_amount: u64, decimals: u8) -> Result<u64> {
    10u64
        .checked_pow(decimals as u32)
        .and_then(|scale| ui_amount.checked_mul(scale))
        .ok_or_else(|| EscrowError::Encoding(format!("{ui_amount} tokens with {decimals} decimals overflows u64")))
}

pub struct InitializeAccounts {
    pub initiator: Pubkey,
    pub initiator_temp_token_account: Pubkey,
    pub initiator_receiving_token_account: Pubkey,
    pub escrow_account: Pubkey
}

pub struct ExchangeAccounts {
    pub counterparty: Pubkey,
    pub counterparty_send_token_account: Pubkey,
    pub counterparty_receive_token_account: Pubkey,
    pub initiator_temp_token_account: Pubkey,
    pub initiator: Pubkey,
    pub initiator_receiving_token_account: Pubkey,
    pub escrow_account: Pubkey,
    pub escrow_pda: Pubkey
}

pub struct CancelAccounts {
    pub initiator: Pubkey,
    pub escrow_account: Pubkey,
    pub initiator_temp_token_account: Pubkey,
    pub initiator_receiving_token_account: Pubkey,
    pub escrow_pda: Pubkey
}

pub fn initialize(ids: &ProgramIds, accounts: &InitializeAccounts, expected_amount: u64) -> Instruction {
    Instruction::new_with_bytes(
        ids.escrow,
        &EscrowInstruction::Initialize { expected_amount }.pack(),
        vec![
            AccountMeta::new_readonly(accounts.initiator, true),
            AccountMeta::new(accounts.initiator_temp_token_account, false),
            AccountMeta::new_readonly(accounts.initiator_receiving_token_account, false),
            AccountMeta::new(accounts.escrow_account, false),
            AccountMeta::new_readonly(ids.token, false)
        ]
    )
}

pub fn exchange(ids: &ProgramIds, accounts: &ExchangeAccounts, amount: u64) -> Instruction {
    Instruction::new_with_bytes(
        ids.escrow,
        &EscrowInstruction::Exchange { amount }.pack(),
        vec![
            AccountMeta::new_readonly(accounts.counterparty, true),
            AccountMeta::new(accounts.counterparty_send_token_account, false),
            AccountMeta::new(accounts.counterparty_receive_token_account, false),
            AccountMeta::new(accounts.initiator_temp_token_account, false),
            AccountMeta::new(accounts.initiator, false),
            AccountMeta::new(accounts.initiator_receiving_token_account, false),
            AccountMeta::new(accounts.escrow_account, false),
            AccountMeta::new_readonly(ids.token, false),
            // signs inner transfers through invoke_signed, never a wallet signer
            AccountMeta::new_readonly(accounts.escrow_pda, false)
        ]
    )
}

pub fn cancel(ids: &ProgramIds, accounts: &CancelAccounts) -> Instruction {
    Instruction::new_with_bytes(
        ids.escrow,
        &EscrowInstruction::Cancel.pack(),
        vec![
            AccountMeta::new_readonly(accounts.initiator, true),
            AccountMeta::new(accounts.escrow_account, false),
            AccountMeta::new(accounts.initiator_temp_token_account, false),
            AccountMeta::new(accounts.initiator_receiving_token_account, false),
            AccountMeta::new_readonly(ids.token, false),
            AccountMeta::new_readonly(accounts.escrow_pda, false)
        ]
    )
}

/// Expected signer / writable flags of one positional account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountRole {
    pub name: &'static str,
    pub is_signer: bool,
    pub is_writable: bool
}

const fn role(name: &'static str, is_signer: bool, is_writable: bool) -> AccountRole {
    AccountRole { name, is_signer, is_writable }
}

pub const INITIALIZE_ROLES: [AccountRole; 5] = [
    role("initiator", true, false),
    role("initiator temp token account", false, true),
    role("initiator receiving token account", false, false),
    role("escrow account", false, true),
    role("token program", false, false)
];

pub const EXCHANGE_ROLES: [AccountRole; 9] = [
    role("counterparty", true, false),
    role("counterparty send token account", false, true),
    role("counterparty receive token account", false, true),
    role("initiator temp token account", false, true),
    role("initiator", false, true),
    role("initiator receiving token account", false, true),
    role("escrow account", false, true),
    role("token program", false, false),
    role("escrow PDA", false, false)
];

pub const CANCEL_ROLES: [AccountRole; 6] = [
    role("initiator", true, false),
    role("escrow account", false, true),
    role("initiator temp token account", false, true),
    role("initiator receiving token account", false, true),
    role("token program", false, false),
    role("escrow PDA", false, false)
];

/// Role table for an encoded escrow instruction, picked by its opcode.
pub fn roles_for(data: &[u8]) -> Result<&'static [AccountRole]> {
    let roles: &'static [AccountRole] = match EscrowInstruction::unpack(data)? {
        EscrowInstruction::Initialize { .. } => &INITIALIZE_ROLES,
        EscrowInstruction::Exchange { .. } => &EXCHANGE_ROLES,
        EscrowInstruction::Cancel => &CANCEL_ROLES
    };
    Ok(roles)
}

/// Checks that `ix` lists exactly the accounts of `roles`, in order, with the same flags.
pub fn verify_account_roles(ix: &Instruction, roles: &[AccountRole]) -> Result<()> {
    if ix.accounts.len() != roles.len() {
        return Err(EscrowError::InvariantViolation(format!(
            "instruction lists {} accounts, program expects {}", ix.accounts.len(), roles.len()
        )));
    }

    for (index, (meta, role)) in ix.accounts.iter().zip(roles).enumerate() {
        if meta.is_signer != role.is_signer || meta.is_writable != role.is_writable {
            return Err(EscrowError::InvariantViolation(format!(
                "account #{index} ({}) is signer={} writable={}, expected signer={} writable={}",
                role.name, meta.is_signer, meta.is_writable, role.is_signer, role.is_writable
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> ProgramIds {
        ProgramIds { escrow: Pubkey::new_unique(), token: spl_token::id() }
    }

    fn keys(ix: &Instruction) -> Vec<Pubkey> {
        ix.accounts.iter().map(|meta| meta.pubkey).collect()
    }

    #[test]
    fn initialize_layout() {
        let ids = ids();
        let accounts = InitializeAccounts {
            initiator: Pubkey::new_unique(),
            initiator_temp_token_account: Pubkey::new_unique(),
            initiator_receiving_token_account: Pubkey::new_unique(),
            escrow_account: Pubkey::new_unique()
        };
        let ix = initialize(&ids, &accounts, 10_000_000);

        assert_eq!(ix.program_id, ids.escrow);
        assert_eq!(ix.data.len(), 9);
        assert_eq!(ix.data[0], INITIALIZE_OPCODE);
        assert_eq!(&ix.data[1..], &10_000_000u64.to_le_bytes());
        assert_eq!(keys(&ix), vec![
            accounts.initiator,
            accounts.initiator_temp_token_account,
            accounts.initiator_receiving_token_account,
            accounts.escrow_account,
            ids.token
        ]);
        verify_account_roles(&ix, &INITIALIZE_ROLES).unwrap();
    }

    #[test]
    fn exchange_layout() {
        let ids = ids();
        let accounts = ExchangeAccounts {
            counterparty: Pubkey::new_unique(),
            counterparty_send_token_account: Pubkey::new_unique(),
            counterparty_receive_token_account: Pubkey::new_unique(),
            initiator_temp_token_account: Pubkey::new_unique(),
            initiator: Pubkey::new_unique(),
            initiator_receiving_token_account: Pubkey::new_unique(),
            escrow_account: Pubkey::new_unique(),
            escrow_pda: Pubkey::new_unique()
        };
        let ix = exchange(&ids, &accounts, 5_000_000);

        assert_eq!(ix.data, vec![1, 0x40, 0x4b, 0x4c, 0, 0, 0, 0, 0]);
        assert_eq!(keys(&ix), vec![
            accounts.counterparty,
            accounts.counterparty_send_token_account,
            accounts.counterparty_receive_token_account,
            accounts.initiator_temp_token_account,
            accounts.initiator,
            accounts.initiator_receiving_token_account,
            accounts.escrow_account,
            ids.token,
            accounts.escrow_pda
        ]);
        verify_account_roles(&ix, &EXCHANGE_ROLES).unwrap();

        let signers: Vec<Pubkey> = ix.accounts.iter().filter(|m| m.is_signer).map(|m| m.pubkey).collect();
        assert_eq!(signers, vec![accounts.counterparty]);
    }

    #[test]
    fn cancel_layout() {
        let ids = ids();
        let accounts = CancelAccounts {
            initiator: Pubkey::new_unique(),
            escrow_account: Pubkey::new_unique(),
            initiator_temp_token_account: Pubkey::new_unique(),
            initiator_receiving_token_account: Pubkey::new_unique(),
            escrow_pda: Pubkey::new_unique()
        };
        let ix = cancel(&ids, &accounts);

        assert_eq!(ix.data, vec![CANCEL_OPCODE]);
        assert_eq!(keys(&ix), vec![
            accounts.initiator,
            accounts.escrow_account,
            accounts.initiator_temp_token_account,
            accounts.initiator_receiving_token_account,
            ids.token,
            accounts.escrow_pda
        ]);
        verify_account_roles(&ix, &CANCEL_ROLES).unwrap();
        assert_eq!(roles_for(&ix.data).unwrap(), &CANCEL_ROLES);
    }

    #[test]
    fn role_mismatch_is_reported() {
        let ids = ids();
        let mut ix = cancel(&ids, &CancelAccounts {
            initiator: Pubkey::new_unique(),
            escrow_account: Pubkey::new_unique(),
            initiator_temp_token_account: Pubkey::new_unique(),
            initiator_receiving_token_account: Pubkey::new_unique(),
            escrow_pda: Pubkey::new_unique()
        });

        assert!(verify_account_roles(&ix, &EXCHANGE_ROLES).is_err());

        ix.accounts[5].is_signer = true;
        let err = verify_account_roles(&ix, &CANCEL_ROLES).unwrap_err();
        assert!(err.to_string().contains("escrow PDA"));
    }

    #[test]
    fn unpack_parses_packed_instructions() {
        for ix in [
            EscrowInstruction::Initialize { expected_amount: 0 },
            EscrowInstruction::Exchange { amount: u64::MAX },
            EscrowInstruction::Cancel
        ] {
            assert_eq!(EscrowInstruction::unpack(&ix.pack()).unwrap(), ix);
        }
    }

    #[test]
    fn unpack_rejects_malformed_data() {
        assert!(EscrowInstruction::unpack(&[]).is_err());
        assert!(EscrowInstruction::unpack(&[3]).is_err());
        assert!(EscrowInstruction::unpack(&[0, 1, 2]).is_err());
        assert!(EscrowInstruction::unpack(&[1; 10]).is_err());
        assert!(EscrowInstruction::unpack(&[2, 0]).is_err());
    }

    #[test]
    fn amount_encoding_bounds() {
        for n in [0u64, 1, 255, 10_000_000, u64::MAX - 1, u64::MAX] {
            let bytes = encode_amount(n as u128).unwrap();
            assert_eq!(decode_amount(&bytes).unwrap(), n);
        }
        assert!(matches!(encode_amount(u64::MAX as u128 + 1), Err(EscrowError::Encoding(_))));
        assert!(matches!(encode_amount(u128::MAX), Err(EscrowError::Encoding(_))));
    }

    #[test]
    fn base_units_scale_and_overflow() {
        assert_eq!(to_base_units(10, 6).unwrap(), 10_000_000);
        assert_eq!(to_base_units(5, 0).unwrap(), 5);
        assert!(to_base_units(u64::MAX, 6).is_err());
        assert!(to_base_units(1, 20).is_err());
    }
}
