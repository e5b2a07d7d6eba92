#![no_std]

//! # Shadow Diplomacy
//!
//! A diplomacy game where registered players send each other confidential
//! actions: **alliance**, **attack** or **cancel alliance**.
//!
//! ## Dual channel actions
//! Every `submit_action` carries the action twice:
//! - `action_value` — the plaintext code (1/2/3) that drives the public
//!   alliance state machine;
//! - `encrypted_action` — a ciphertext handle from the FHE executor, stored
//!   as the durable confidential record of what the actor did.
//!
//! `input_proof` binds the two together. The FHE executor checks that the
//! ciphertext encodes `action_value` and was produced by the actor for this
//! contract, so the actor cannot claim one action publicly while storing
//! another.
//!
//! ## Alliance rules
//! Alliance status is kept per unordered pair and is symmetric: a single
//! proposal from either side makes the pair allied. Allied players cannot
//! attack each other until one of them cancels.
//!
//! ```text
//!            alliance                 attack (rejected)
//!   Neutral ──────────▶ Allied ◀──────────────┐
//!      ▲                  │  └────────────────┘
//!      └──────────────────┘
//!             cancel
//! ```

use soroban_sdk::{
    contract, contractclient, contracterror, contractevent, contractimpl, contracttype, Address,
    Bytes, BytesN, Env, String, Vec,
};

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract Events
// ═══════════════════════════════════════════════════════════════════════════════

#[contractevent]
pub struct EvPlayerRegistered {
    #[topic]
    pub player: Address,
    #[topic]
    pub player_id: u32,
    pub name: String,
}

/// Emitted when a ciphertext is stored for (actor, target). The action
/// itself is not part of the event.
#[contractevent]
pub struct EvActionStored {
    #[topic]
    pub actor: Address,
    #[topic]
    pub target: Address,
}

#[contractevent]
pub struct EvAllianceStatusChanged {
    #[topic]
    pub player: Address,
    #[topic]
    pub counterparty: Address,
    pub allied: bool,
}

#[contractevent]
pub struct EvAttackRecorded {
    #[topic]
    pub attacker: Address,
    #[topic]
    pub defender: Address,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  External trait interfaces
// ═══════════════════════════════════════════════════════════════════════════════

/// FHE executor: verifies encrypted inputs and manages ciphertext access.
///
/// `verify_input` returns true only if `input_proof` proves that `handle`
/// encrypts `claimed` and was built by `submitter` for `contract`. A
/// successful verification grants `contract` access to the handle, which
/// lets it call `allow` for other accounts.
#[contractclient(name = "FheExecutorClient")]
pub trait FheExecutor {
    fn verify_input(
        env: Env,
        handle: BytesN<32>,
        contract: Address,
        submitter: Address,
        claimed: u32,
        input_proof: Bytes,
    ) -> bool;

    fn allow(env: Env, caller: Address, handle: BytesN<32>, account: Address);
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum DiplomacyError {
    EmptyName = 1,
    AlreadyRegistered = 2,
    NameTaken = 3,
    PlayerNotFound = 4,
    CannotTargetSelf = 5,
    InvalidAction = 6,
    AlliedPlayersCannotAttack = 7,
    InvalidInputProof = 8,
    AdminNotSet = 9,
    FheExecutorNotSet = 10,
    PlayerIdsExhausted = 11,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Action codes
// ═══════════════════════════════════════════════════════════════════════════════

pub(crate) type ActionCode = u32;

pub const ACTION_ALLIANCE: ActionCode = 1;
pub const ACTION_ATTACK: ActionCode = 2;
pub const ACTION_CANCEL: ActionCode = 3;

// ═══════════════════════════════════════════════════════════════════════════════
//  Player records & storage keys
// ═══════════════════════════════════════════════════════════════════════════════

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlayerInfo {
    pub id: u32,
    pub name: String,
    pub account: Address,
}

#[contracttype]
#[derive(Clone)]
enum StorageKey {
    Admin,
    FheExecutor,
    NextPlayerId,
    /// account → player id
    PlayerId(Address),
    /// player id → PlayerInfo
    Player(u32),
    /// name → owning account
    NameOwner(String),
    /// (actor, target) → latest ciphertext handle
    Action(Address, Address),
    /// (lower, higher) address pair → allied flag, present only while allied
    Alliance(Address, Address),
    /// (attacker, defender) → number of recorded attacks
    Attacks(Address, Address),
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Constants
// ═══════════════════════════════════════════════════════════════════════════════

/// Identifier of the confidential-computation deployment this contract targets.
pub const PROTOCOL_ID: u32 = 10001;

const FIRST_PLAYER_ID: u32 = 1;

// Ledger rate is approximately 5 seconds per ledger on Stellar
const LEDGER_RATE_SECS: u32 = 5;

// TTL expressed in human-readable time units (120 days)
const TTL_SECONDS: u32 = 120 * 24 * 60 * 60;

/// TTL for registry and diplomacy data in ledgers: 2,073,600 ledgers
const DATA_TTL_LEDGERS: u32 = TTL_SECONDS / LEDGER_RATE_SECS;

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract
// ═══════════════════════════════════════════════════════════════════════════════

#[contract]
pub struct ShadowDiplomacyContract;

#[contractimpl]
impl ShadowDiplomacyContract {
    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Constructor
    // ───────────────────────────────────────────────────────────────────────────

    pub fn __constructor(env: Env, admin: Address, fhe_executor: Address) {
        env.storage()
            .instance()
            .set(&StorageKey::Admin, &admin);
        env.storage()
            .instance()
            .set(&StorageKey::FheExecutor, &fhe_executor);
        env.storage()
            .instance()
            .set(&StorageKey::NextPlayerId, &FIRST_PLAYER_ID);
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Player Registry
    // ───────────────────────────────────────────────────────────────────────────

    /// Register `player` under `name` and return the new player id.
    ///
    /// Names must be non-blank and unique (exact, case-sensitive match).
    /// Each account registers once.
    pub fn register(env: Env, player: Address, name: String) -> Result<u32, DiplomacyError> {
        player.require_auth();

        Self::check_name(&name)?;

        let name_key = StorageKey::NameOwner(name.clone());
        if env.storage().persistent().has(&name_key) {
            return Err(DiplomacyError::NameTaken);
        }
        let id_key = StorageKey::PlayerId(player.clone());
        if env.storage().persistent().has(&id_key) {
            return Err(DiplomacyError::AlreadyRegistered);
        }

        let player_id = Self::load_next_player_id(&env);
        let next_id = player_id
            .checked_add(1)
            .ok_or(DiplomacyError::PlayerIdsExhausted)?;
        env.storage()
            .instance()
            .set(&StorageKey::NextPlayerId, &next_id);

        let info = PlayerInfo {
            id: player_id,
            name: name.clone(),
            account: player.clone(),
        };
        Self::write_persistent(&env, &StorageKey::Player(player_id), &info);
        Self::write_persistent(&env, &id_key, &player_id);
        Self::write_persistent(&env, &name_key, &player);

        EvPlayerRegistered {
            player,
            player_id,
            name,
        }.publish(&env);

        Self::bump_instance(&env);
        Ok(player_id)
    }

    pub fn is_registered(env: Env, account: Address) -> bool {
        env.storage()
            .persistent()
            .has(&StorageKey::PlayerId(account))
    }

    pub fn get_player(env: Env, account: Address) -> Result<PlayerInfo, DiplomacyError> {
        Self::read_player(&env, &account)
    }

    /// All players in registration (id) order.
    pub fn get_players(env: Env) -> Vec<PlayerInfo> {
        let next_id = Self::load_next_player_id(&env);
        let mut players = Vec::new(&env);
        for id in FIRST_PLAYER_ID..next_id {
            if let Some(info) = env
                .storage()
                .persistent()
                .get::<StorageKey, PlayerInfo>(&StorageKey::Player(id))
            {
                players.push_back(info);
            }
        }
        players
    }

    /// Player names in registration (id) order.
    pub fn get_player_names(env: Env) -> Vec<String> {
        let mut names = Vec::new(&env);
        for info in Self::get_players(env.clone()).iter() {
            names.push_back(info.name);
        }
        names
    }

    /// Id the next registration will receive.
    pub fn next_player_id(env: Env) -> u32 {
        Self::load_next_player_id(&env)
    }

    pub fn player_count(env: Env) -> u32 {
        Self::load_next_player_id(&env) - FIRST_PLAYER_ID
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Confidential Actions
    // ───────────────────────────────────────────────────────────────────────────

    /// Submit an encrypted diplomatic action from `actor` toward `target`.
    ///
    /// `action_value` is the plaintext code (`ACTION_ALLIANCE`, `ACTION_ATTACK`
    /// or `ACTION_CANCEL`), `encrypted_action` the ciphertext handle of the
    /// same value and `input_proof` the executor proof binding them to this
    /// contract and `actor`.
    ///
    /// Attacks between allied players are rejected. Every check runs before
    /// any state is written.
    pub fn submit_action(
        env: Env,
        actor: Address,
        target: Address,
        action_value: u32,
        encrypted_action: BytesN<32>,
        input_proof: Bytes,
    ) -> Result<(), DiplomacyError> {
        actor.require_auth();

        Self::read_player(&env, &actor)?;
        if actor == target {
            return Err(DiplomacyError::CannotTargetSelf);
        }
        Self::read_player(&env, &target)?;

        if !Self::is_valid_action(action_value) {
            return Err(DiplomacyError::InvalidAction);
        }

        let alliance_key = Self::alliance_key(&actor, &target);
        let allied = env.storage().persistent().has(&alliance_key);
        if allied && action_value == ACTION_ATTACK {
            return Err(DiplomacyError::AlliedPlayersCannotAttack);
        }

        // Proof obligation: the ciphertext must encrypt `action_value`
        let executor_addr = Self::load_fhe_executor(&env)?;
        let executor = FheExecutorClient::new(&env, &executor_addr);
        let this = env.current_contract_address();
        if !executor.verify_input(&encrypted_action, &this, &actor, &action_value, &input_proof) {
            return Err(DiplomacyError::InvalidInputProof);
        }

        // Keep the ciphertext usable by this contract and decryptable by the actor
        executor.allow(&this, &encrypted_action, &this);
        executor.allow(&this, &encrypted_action, &actor);

        Self::write_persistent(
            &env,
            &StorageKey::Action(actor.clone(), target.clone()),
            &encrypted_action,
        );

        EvActionStored {
            actor: actor.clone(),
            target: target.clone(),
        }.publish(&env);

        Self::apply_alliance_transition(&env, &actor, &target, &alliance_key, allied, action_value);

        Self::bump_instance(&env);
        Ok(())
    }

    /// Latest ciphertext handle `actor` sent to `target`, or the all-zero
    /// handle if none was submitted.
    pub fn get_encrypted_action(env: Env, actor: Address, target: Address) -> BytesN<32> {
        env.storage()
            .persistent()
            .get(&StorageKey::Action(actor, target))
            .unwrap_or(BytesN::from_array(&env, &[0u8; 32]))
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Alliances
    // ───────────────────────────────────────────────────────────────────────────

    pub fn is_allied(env: Env, actor: Address, target: Address) -> bool {
        env.storage()
            .persistent()
            .has(&Self::alliance_key(&actor, &target))
    }

    /// Number of attacks `attacker` has recorded against `defender`.
    pub fn attack_count(env: Env, attacker: Address, defender: Address) -> u32 {
        env.storage()
            .persistent()
            .get(&StorageKey::Attacks(attacker, defender))
            .unwrap_or(0)
    }

    pub fn protocol_id(_env: Env) -> u32 {
        PROTOCOL_ID
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Admin
    // ───────────────────────────────────────────────────────────────────────────

    pub fn get_admin(env: Env) -> Result<Address, DiplomacyError> {
        Self::load_admin(&env)
    }

    pub fn set_admin(env: Env, new_admin: Address) -> Result<(), DiplomacyError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage()
            .instance()
            .set(&StorageKey::Admin, &new_admin);
        Ok(())
    }

    pub fn get_fhe_executor(env: Env) -> Result<Address, DiplomacyError> {
        Self::load_fhe_executor(&env)
    }

    pub fn set_fhe_executor(env: Env, new_executor: Address) -> Result<(), DiplomacyError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage()
            .instance()
            .set(&StorageKey::FheExecutor, &new_executor);
        Ok(())
    }

    pub fn upgrade(env: Env, new_wasm_hash: BytesN<32>) -> Result<(), DiplomacyError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.deployer().update_current_contract_wasm(new_wasm_hash);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Alliance state machine
    // ═══════════════════════════════════════════════════════════════════════════

    /// Apply an already validated action. Attacks on allied pairs never
    /// reach this point.
    fn apply_alliance_transition(
        env: &Env,
        actor: &Address,
        target: &Address,
        alliance_key: &StorageKey,
        allied: bool,
        action_value: ActionCode,
    ) {
        match action_value {
            ACTION_ALLIANCE => {
                if allied {
                    return;
                }
                Self::write_persistent(env, alliance_key, &true);
                EvAllianceStatusChanged {
                    player: actor.clone(),
                    counterparty: target.clone(),
                    allied: true,
                }.publish(env);
            }
            ACTION_ATTACK => {
                let key = StorageKey::Attacks(actor.clone(), target.clone());
                let count: u32 = env.storage().persistent().get(&key).unwrap_or(0);
                Self::write_persistent(env, &key, &count.saturating_add(1));
                EvAttackRecorded {
                    attacker: actor.clone(),
                    defender: target.clone(),
                }.publish(env);
            }
            _ => {
                if !allied {
                    return;
                }
                env.storage().persistent().remove(alliance_key);
                EvAllianceStatusChanged {
                    player: actor.clone(),
                    counterparty: target.clone(),
                    allied: false,
                }.publish(env);
            }
        }
    }

    fn is_valid_action(action_value: u32) -> bool {
        matches!(action_value, ACTION_ALLIANCE | ACTION_ATTACK | ACTION_CANCEL)
    }

    /// Order-independent key for the pair, lower address first.
    fn alliance_key(a: &Address, b: &Address) -> StorageKey {
        if a < b {
            StorageKey::Alliance(a.clone(), b.clone())
        } else {
            StorageKey::Alliance(b.clone(), a.clone())
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Name validation
    // ═══════════════════════════════════════════════════════════════════════════

    /// Blank means empty or only ASCII whitespace.
    fn check_name(name: &String) -> Result<(), DiplomacyError> {
        if name.to_bytes().iter().all(|b| b.is_ascii_whitespace()) {
            return Err(DiplomacyError::EmptyName);
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Storage
    // ═══════════════════════════════════════════════════════════════════════════

    fn read_player(env: &Env, account: &Address) -> Result<PlayerInfo, DiplomacyError> {
        let player_id: u32 = env
            .storage()
            .persistent()
            .get(&StorageKey::PlayerId(account.clone()))
            .ok_or(DiplomacyError::PlayerNotFound)?;
        env.storage()
            .persistent()
            .get(&StorageKey::Player(player_id))
            .ok_or(DiplomacyError::PlayerNotFound)
    }

    fn write_persistent<V>(env: &Env, key: &StorageKey, value: &V)
    where
        V: soroban_sdk::IntoVal<Env, soroban_sdk::Val>,
    {
        env.storage().persistent().set(key, value);
        env.storage()
            .persistent()
            .extend_ttl(key, DATA_TTL_LEDGERS, DATA_TTL_LEDGERS);
    }

    /// Keep instance storage (admin, executor, id counter) alive.
    fn bump_instance(env: &Env) {
        env.storage()
            .instance()
            .extend_ttl(DATA_TTL_LEDGERS, DATA_TTL_LEDGERS);
    }

    fn load_next_player_id(env: &Env) -> u32 {
        env.storage()
            .instance()
            .get(&StorageKey::NextPlayerId)
            .unwrap_or(FIRST_PLAYER_ID)
    }

    fn load_admin(env: &Env) -> Result<Address, DiplomacyError> {
        env.storage()
            .instance()
            .get(&StorageKey::Admin)
            .ok_or(DiplomacyError::AdminNotSet)
    }

    fn load_fhe_executor(env: &Env) -> Result<Address, DiplomacyError> {
        env.storage()
            .instance()
            .get(&StorageKey::FheExecutor)
            .ok_or(DiplomacyError::FheExecutorNotSet)
    }
}
