//! Player Accounts
//!
//! Identities, key hashes and the account store seam. Clients never send a
//! password: they send `SHA-512(salt || password)`, which is stored on
//! registration and compared on login.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Size of a client key hash in bytes (SHA-512).
pub const KEY_HASH_SIZE: usize = 64;

/// Derive the key hash a client sends for `password`.
pub fn hash_key(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha512::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

/// Numeric player identifier, shared by guests and registered accounts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Who a logged-in session is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Player id.
    pub id: PlayerId,
    /// Display name, unique among connected sessions and stored accounts.
    pub name: String,
    /// Whether the identity is backed by a stored account.
    pub registered: bool,
}

/// A stored account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Player id.
    pub id: PlayerId,
    /// Account name.
    pub name: String,
    /// Key hash supplied at registration.
    pub key_hash: Vec<u8>,
    /// Registration time.
    pub registered_at: DateTime<Utc>,
}

impl Account {
    /// Create an account stamped with the current time.
    pub fn new(id: PlayerId, name: impl Into<String>, key_hash: Vec<u8>) -> Self {
        Self {
            id,
            name: name.into(),
            key_hash,
            registered_at: Utc::now(),
        }
    }
}

/// Result of checking a name and key hash against the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialCheck {
    /// No account with that name.
    NotFound,
    /// Key hash matches.
    Valid,
    /// Key hash differs.
    Invalid,
}

/// Account store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An account with that name exists.
    #[error("account name {0:?} already exists")]
    NameTaken(String),
    /// An account with that id exists.
    #[error("player id {0} already exists")]
    IdTaken(PlayerId),
    /// The backing store failed.
    #[error("account store failure: {0}")]
    Backend(String),
}

/// Persistent registry of accounts.
///
/// Called with the directory lock held, so implementations must not block
/// for long.
pub trait AccountStore: Send {
    /// Look up an account by name.
    fn find(&self, name: &str) -> Option<&Account>;

    /// Whether any account has this id.
    fn id_in_use(&self, id: PlayerId) -> bool;

    /// Persist a new account.
    fn create(&mut self, account: Account) -> Result<(), StoreError>;

    /// Check a login attempt.
    fn verify(&self, name: &str, key_hash: &[u8]) -> CredentialCheck {
        match self.find(name) {
            None => CredentialCheck::NotFound,
            Some(account) if account.key_hash == key_hash => CredentialCheck::Valid,
            Some(_) => CredentialCheck::Invalid,
        }
    }
}

/// In-process account store. Accounts last as long as the server.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: BTreeMap<String, Account>,
}

impl MemoryAccountStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether no accounts exist.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl AccountStore for MemoryAccountStore {
    fn find(&self, name: &str) -> Option<&Account> {
        self.accounts.get(name)
    }

    fn id_in_use(&self, id: PlayerId) -> bool {
        self.accounts.values().any(|a| a.id == id)
    }

    fn create(&mut self, account: Account) -> Result<(), StoreError> {
        if self.accounts.contains_key(&account.name) {
            return Err(StoreError::NameTaken(account.name));
        }
        if self.id_in_use(account.id) {
            return Err(StoreError::IdTaken(account.id));
        }
        self.accounts.insert(account.name.clone(), account);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_key_is_sha512_sized() {
        let hash = hash_key(b"salt", "hunter2");
        assert_eq!(hash.len(), KEY_HASH_SIZE);
        assert_eq!(hash, hash_key(b"salt", "hunter2"));
        assert_ne!(hash, hash_key(b"pepper", "hunter2"));
        assert_ne!(hash, hash_key(b"salt", "hunter3"));
    }

    #[test]
    fn test_verify_credentials() {
        let mut store = MemoryAccountStore::new();
        let key = hash_key(b"s", "pw");
        store.create(Account::new(PlayerId(1), "Alice", key.clone())).unwrap();

        assert_eq!(store.verify("Alice", &key), CredentialCheck::Valid);
        assert_eq!(store.verify("Alice", &hash_key(b"s", "nope")), CredentialCheck::Invalid);
        assert_eq!(store.verify("Bob", &key), CredentialCheck::NotFound);
    }

    #[test]
    fn test_create_rejects_duplicates() {
        let mut store = MemoryAccountStore::new();
        store.create(Account::new(PlayerId(1), "Alice", vec![0; 64])).unwrap();

        let dup_name = store.create(Account::new(PlayerId(2), "Alice", vec![0; 64]));
        assert!(matches!(dup_name, Err(StoreError::NameTaken(_))));

        let dup_id = store.create(Account::new(PlayerId(1), "Bob", vec![0; 64]));
        assert!(matches!(dup_id, Err(StoreError::IdTaken(PlayerId(1)))));

        assert_eq!(store.len(), 1);
        assert!(store.id_in_use(PlayerId(1)));
        assert!(!store.id_in_use(PlayerId(2)));
    }

    #[test]
    fn test_player_id_display() {
        assert_eq!(PlayerId(255).to_string(), "00000000000000ff");
    }
}
