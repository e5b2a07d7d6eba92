#![no_std]

//! # Mock FHE Executor
//!
//! Local stand-in for the confidential-computation runtime that Shadow
//! Diplomacy consumes. It covers the four things the game needs from the
//! runtime:
//!
//! | Step                 | Function        | Real runtime equivalent                |
//! |----------------------|-----------------|----------------------------------------|
//! | Encrypted input      | `encrypt_u8`    | client-side `createEncryptedInput`     |
//! | Input verification   | `verify_input`  | input verifier / coprocessor signature |
//! | Access control       | `allow`         | ACL grant                              |
//! | User decryption      | `user_decrypt`  | KMS re-encryption for a viewer         |
//!
//! Plaintexts are kept in contract storage so tests can decrypt them. This is
//! **not** confidential and must never be deployed outside local networks.
//!
//! ## Handle and proof layout
//!
//! ```text
//! handle      = keccak256("EU8" || nonce_be4 || contract || submitter)
//! input_proof = keccak256("IPRF" || handle || contract || submitter || value_be4)
//! ```
//!
//! The proof binds the claimed plaintext to the handle, the consuming
//! contract and the submitter, so a submitter cannot reuse someone else's
//! ciphertext or claim a different value than the one encrypted.

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, Address, Bytes, BytesN,
    Env,
};

// ═══════════════════════════════════════════════════════════════════════════════
//  Error codes
// ═══════════════════════════════════════════════════════════════════════════════

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum MockFheError {
    HandleNotFound = 1,
    NotAllowed = 2,
    ValueOutOfRange = 3,
    // Input verification failures (reported as EvInputRejected reasons)
    ContractMismatch = 4,
    SubmitterMismatch = 5,
    ValueMismatch = 6,
    ProofMismatch = 7,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Events
// ═══════════════════════════════════════════════════════════════════════════════

#[contractevent]
pub struct EvInputEncrypted {
    pub handle: BytesN<32>,
    pub contract: Address,
    pub submitter: Address,
}

#[contractevent]
pub struct EvInputVerified {
    pub handle: BytesN<32>,
    pub contract: Address,
}

#[contractevent]
pub struct EvInputRejected {
    pub reason: u32,
}

#[contractevent]
pub struct EvAccessGranted {
    pub handle: BytesN<32>,
    pub account: Address,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Types & storage keys
// ═══════════════════════════════════════════════════════════════════════════════

/// Output of the client-side encryption step: a handle to pass on-chain and
/// the proof that binds it to its plaintext.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncryptedInput {
    pub handle: BytesN<32>,
    pub input_proof: Bytes,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CiphertextRecord {
    pub value: u32,
    pub contract: Address,
    pub submitter: Address,
}

#[contracttype]
#[derive(Clone)]
enum StorageKey {
    Nonce,
    Ciphertext(BytesN<32>),
    Acl(BytesN<32>, Address),
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Constants
// ═══════════════════════════════════════════════════════════════════════════════

/// Domain separator for handle derivation: ASCII "EU8"
const HANDLE_TAG: [u8; 3] = [0x45, 0x55, 0x38];

/// Domain separator for input proofs: ASCII "IPRF"
const PROOF_TAG: [u8; 4] = [0x49, 0x50, 0x52, 0x46];

const MAX_U8_VALUE: u32 = 0xFF;

// Ledger rate is approximately 5 seconds per ledger on Stellar
const LEDGER_RATE_SECS: u32 = 5;

// 30 days, matching the lifetime of a local test network
const TTL_SECONDS: u32 = 30 * 24 * 60 * 60;
const TTL_LEDGERS: u32 = TTL_SECONDS / LEDGER_RATE_SECS;

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract
// ═══════════════════════════════════════════════════════════════════════════════

#[contract]
pub struct MockFheExecutor;

#[contractimpl]
impl MockFheExecutor {
    /// Encrypt an 8-bit value for `submitter` to hand to `contract`.
    pub fn encrypt_u8(
        env: Env,
        contract: Address,
        submitter: Address,
        value: u32,
    ) -> Result<EncryptedInput, MockFheError> {
        submitter.require_auth();

        if value > MAX_U8_VALUE {
            return Err(MockFheError::ValueOutOfRange);
        }

        let nonce: u32 = env.storage().instance().get(&StorageKey::Nonce).unwrap_or(0);
        env.storage()
            .instance()
            .set(&StorageKey::Nonce, &nonce.saturating_add(1));

        let mut pre = Bytes::from_array(&env, &HANDLE_TAG);
        pre.append(&Bytes::from_array(&env, &nonce.to_be_bytes()));
        pre.append(&contract.to_string().to_bytes());
        pre.append(&submitter.to_string().to_bytes());
        let handle: BytesN<32> = env.crypto().keccak256(&pre).into();

        let record = CiphertextRecord {
            value,
            contract: contract.clone(),
            submitter: submitter.clone(),
        };
        let key = StorageKey::Ciphertext(handle.clone());
        env.storage().persistent().set(&key, &record);
        env.storage().persistent().extend_ttl(&key, TTL_LEDGERS, TTL_LEDGERS);
        Self::grant(&env, &handle, &submitter);

        let input_proof = Self::compute_proof(&env, &handle, &contract, &submitter, value);

        EvInputEncrypted {
            handle: handle.clone(),
            contract,
            submitter,
        }.publish(&env);

        Ok(EncryptedInput { handle, input_proof })
    }

    /// Verify that `input_proof` binds `handle` to (`contract`, `submitter`,
    /// `claimed`). On success `contract` gains access to the handle.
    ///
    /// Returns `false` on any mismatch; the reason is published as an event.
    pub fn verify_input(
        env: Env,
        handle: BytesN<32>,
        contract: Address,
        submitter: Address,
        claimed: u32,
        input_proof: Bytes,
    ) -> bool {
        contract.require_auth();

        let record: CiphertextRecord = match env
            .storage()
            .persistent()
            .get(&StorageKey::Ciphertext(handle.clone()))
        {
            Some(record) => record,
            None => return Self::reject(&env, MockFheError::HandleNotFound),
        };

        if record.contract != contract {
            return Self::reject(&env, MockFheError::ContractMismatch);
        }
        if record.submitter != submitter {
            return Self::reject(&env, MockFheError::SubmitterMismatch);
        }
        if record.value != claimed {
            return Self::reject(&env, MockFheError::ValueMismatch);
        }
        let expected = Self::compute_proof(&env, &handle, &contract, &submitter, claimed);
        if expected != input_proof {
            return Self::reject(&env, MockFheError::ProofMismatch);
        }

        Self::grant(&env, &handle, &contract);
        EvInputVerified { handle, contract }.publish(&env);
        true
    }

    /// Grant `account` access to `handle`. `caller` must already have access.
    pub fn allow(
        env: Env,
        caller: Address,
        handle: BytesN<32>,
        account: Address,
    ) -> Result<(), MockFheError> {
        caller.require_auth();
        Self::require_handle(&env, &handle)?;
        if !Self::has_access(&env, &handle, &caller) {
            return Err(MockFheError::NotAllowed);
        }
        Self::grant(&env, &handle, &account);
        EvAccessGranted { handle, account }.publish(&env);
        Ok(())
    }

    pub fn is_allowed(env: Env, handle: BytesN<32>, account: Address) -> bool {
        Self::has_access(&env, &handle, &account)
    }

    /// Decrypt `handle` for an authorized `viewer`.
    pub fn user_decrypt(
        env: Env,
        handle: BytesN<32>,
        viewer: Address,
    ) -> Result<u32, MockFheError> {
        viewer.require_auth();
        let record = Self::require_handle(&env, &handle)?;
        if !Self::has_access(&env, &handle, &viewer) {
            return Err(MockFheError::NotAllowed);
        }
        Ok(record.value)
    }

    // ─── Internal helpers ──────────────────────────────────────────────────

    fn compute_proof(
        env: &Env,
        handle: &BytesN<32>,
        contract: &Address,
        submitter: &Address,
        value: u32,
    ) -> Bytes {
        let mut pre = Bytes::from_array(env, &PROOF_TAG);
        pre.append(&Bytes::from_array(env, &handle.to_array()));
        pre.append(&contract.to_string().to_bytes());
        pre.append(&submitter.to_string().to_bytes());
        pre.append(&Bytes::from_array(env, &value.to_be_bytes()));
        let digest: BytesN<32> = env.crypto().keccak256(&pre).into();
        Bytes::from_array(env, &digest.to_array())
    }

    fn reject(env: &Env, reason: MockFheError) -> bool {
        EvInputRejected { reason: reason as u32 }.publish(env);
        false
    }

    fn require_handle(
        env: &Env,
        handle: &BytesN<32>,
    ) -> Result<CiphertextRecord, MockFheError> {
        env.storage()
            .persistent()
            .get(&StorageKey::Ciphertext(handle.clone()))
            .ok_or(MockFheError::HandleNotFound)
    }

    fn has_access(env: &Env, handle: &BytesN<32>, account: &Address) -> bool {
        env.storage()
            .persistent()
            .get(&StorageKey::Acl(handle.clone(), account.clone()))
            .unwrap_or(false)
    }

    fn grant(env: &Env, handle: &BytesN<32>, account: &Address) {
        let key = StorageKey::Acl(handle.clone(), account.clone());
        env.storage().persistent().set(&key, &true);
        env.storage().persistent().extend_ttl(&key, TTL_LEDGERS, TTL_LEDGERS);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use soroban_sdk::testutils::Address as _;

    fn setup() -> (Env, MockFheExecutorClient<'static>, Address, Address) {
        let env = Env::default();
        env.mock_all_auths();

        let executor_id = env.register(MockFheExecutor, ());
        let client = MockFheExecutorClient::new(&env, &executor_id);

        let contract = Address::generate(&env);
        let submitter = Address::generate(&env);
        (env, client, contract, submitter)
    }

    #[test]
    fn encrypt_then_verify_accepts_honest_input() {
        let (_env, client, contract, submitter) = setup();
        let input = client.encrypt_u8(&contract, &submitter, &2);

        assert!(client.verify_input(&input.handle, &contract, &submitter, &2, &input.input_proof));
        assert!(client.is_allowed(&input.handle, &contract));
    }

    #[test]
    fn handles_are_unique_per_encryption() {
        let (_env, client, contract, submitter) = setup();
        let a = client.encrypt_u8(&contract, &submitter, &1);
        let b = client.encrypt_u8(&contract, &submitter, &1);
        assert_ne!(a.handle, b.handle);
    }

    #[test]
    fn verify_rejects_wrong_claimed_value() {
        let (_env, client, contract, submitter) = setup();
        let input = client.encrypt_u8(&contract, &submitter, &2);

        assert!(!client.verify_input(&input.handle, &contract, &submitter, &1, &input.input_proof));
        // A failed verification never grants the consuming contract access
        assert!(!client.is_allowed(&input.handle, &contract));
    }

    #[test]
    fn verify_rejects_foreign_submitter() {
        let (env, client, contract, submitter) = setup();
        let thief = Address::generate(&env);
        let input = client.encrypt_u8(&contract, &submitter, &1);

        assert!(!client.verify_input(&input.handle, &contract, &thief, &1, &input.input_proof));
    }

    #[test]
    fn verify_rejects_other_contract() {
        let (env, client, contract, submitter) = setup();
        let other = Address::generate(&env);
        let input = client.encrypt_u8(&contract, &submitter, &3);

        assert!(!client.verify_input(&input.handle, &other, &submitter, &3, &input.input_proof));
    }

    #[test]
    fn verify_rejects_tampered_proof() {
        let (env, client, contract, submitter) = setup();
        let input = client.encrypt_u8(&contract, &submitter, &3);
        let tampered = Bytes::from_array(&env, &[7u8; 32]);

        assert!(!client.verify_input(&input.handle, &contract, &submitter, &3, &tampered));
    }

    #[test]
    fn verify_rejects_unknown_handle() {
        let (env, client, contract, submitter) = setup();
        let unknown = BytesN::from_array(&env, &[9u8; 32]);
        let proof = Bytes::from_array(&env, &[0u8; 32]);

        assert!(!client.verify_input(&unknown, &contract, &submitter, &1, &proof));
    }

    #[test]
    fn encrypt_rejects_values_above_u8() {
        let (_env, client, contract, submitter) = setup();
        let result = client.try_encrypt_u8(&contract, &submitter, &256);
        assert_eq!(result, Err(Ok(MockFheError::ValueOutOfRange)));
    }

    #[test]
    fn encrypt_records_submitter_auth() {
        let (env, client, contract, submitter) = setup();
        client.encrypt_u8(&contract, &submitter, &1);

        let auths = env.auths();
        assert_eq!(auths.len(), 1);
        assert_eq!(auths[0].0, submitter);
    }

    #[test]
    #[should_panic]
    fn encrypt_requires_submitter_auth() {
        let (env, client, contract, submitter) = setup();

        env.mock_auths(&[]);
        client.encrypt_u8(&contract, &submitter, &1);
    }

    #[test]
    fn submitter_can_decrypt_own_input() {
        let (_env, client, contract, submitter) = setup();
        let input = client.encrypt_u8(&contract, &submitter, &42);
        assert_eq!(client.user_decrypt(&input.handle, &submitter), 42);
    }

    #[test]
    fn stranger_cannot_decrypt_until_allowed() {
        let (env, client, contract, submitter) = setup();
        let stranger = Address::generate(&env);
        let input = client.encrypt_u8(&contract, &submitter, &1);

        let result = client.try_user_decrypt(&input.handle, &stranger);
        assert_eq!(result, Err(Ok(MockFheError::NotAllowed)));

        client.allow(&submitter, &input.handle, &stranger);
        assert_eq!(client.user_decrypt(&input.handle, &stranger), 1);
    }

    #[test]
    fn allow_requires_existing_access() {
        let (env, client, contract, submitter) = setup();
        let outsider = Address::generate(&env);
        let input = client.encrypt_u8(&contract, &submitter, &1);

        let result = client.try_allow(&outsider, &input.handle, &outsider);
        assert_eq!(result, Err(Ok(MockFheError::NotAllowed)));
    }

    #[test]
    fn allow_unknown_handle_rejected() {
        let (env, client, _contract, submitter) = setup();
        let unknown = BytesN::from_array(&env, &[1u8; 32]);

        let result = client.try_allow(&submitter, &unknown, &submitter);
        assert_eq!(result, Err(Ok(MockFheError::HandleNotFound)));
    }
}
