// src/credential/mod.rs
// Token issuance, validation, and the contact directory. Persisted as one
// JSON file per owner (`a2a.json`), atomically replaced on every mutation.

pub mod contact;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use contact::Contact;

use crate::crypto;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Public,
    Friends,
    Family,
    Custom,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Public => "public",
            Tier::Friends => "friends",
            Tier::Family => "family",
            Tier::Custom => "custom",
        }
    }

    /// Maps legacy tier names to their current equivalent. Applied at the
    /// deserialisation boundary so a legacy on-disk store is mapped rather
    /// than rejected as corrupt; never written back.
    pub fn parse_with_legacy_alias(raw: &str) -> Option<Tier> {
        match raw {
            "public" | "chat-only" => Some(Tier::Public),
            "friends" | "tools-read" => Some(Tier::Friends),
            "family" | "tools-write" => Some(Tier::Family),
            "custom" => Some(Tier::Custom),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for Tier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Tier::parse_with_legacy_alias(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown token tier: {raw}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disclosure {
    None,
    Minimal,
    Public,
}

impl Disclosure {
    pub fn as_str(self) -> &'static str {
        match self {
            Disclosure::None => "none",
            Disclosure::Minimal => "minimal",
            Disclosure::Public => "public",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenValidationError {
    TokenNotFound,
    TokenRevoked,
    TokenExpired,
    MaxCallsExceeded,
    InvalidTokenTier,
}

impl TokenValidationError {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenValidationError::TokenNotFound => "token_not_found",
            TokenValidationError::TokenRevoked => "token_revoked",
            TokenValidationError::TokenExpired => "token_expired",
            TokenValidationError::MaxCallsExceeded => "max_calls_exceeded",
            TokenValidationError::InvalidTokenTier => "invalid_token_tier",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub token_hash: String,
    pub name: String,
    pub owner: String,
    pub tier: Tier,
    pub capabilities: Vec<String>,
    pub allowed_topics: Vec<String>,
    pub allowed_goals: Vec<String>,
    pub disclosure: Disclosure,
    pub notify: bool,
    pub max_calls: Option<i64>,
    pub calls_made: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct TierSettings {
    pub topics: Vec<String>,
    pub goals: Vec<String>,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateTokenRequest {
    pub name: String,
    pub owner: String,
    pub expires: String, // duration string, parsed via crypto::parse_duration
    pub tier: Tier,
    pub disclosure: Disclosure,
    pub notify: bool,
    pub max_calls: Option<i64>,
    pub capabilities: Option<Vec<String>>,
    pub allowed_topics: Option<Vec<String>>,
    pub allowed_goals: Option<Vec<String>>,
    pub tier_settings: Option<TierSettings>,
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Public
    }
}

impl Default for Disclosure {
    fn default() -> Self {
        Disclosure::Minimal
    }
}

pub struct CreatedToken {
    pub token: Token,
    /// Plaintext credential; exists only in this return value.
    pub plaintext: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ValidationResult {
    Valid {
        valid: bool,
        id: String,
        name: String,
        tier: Tier,
        capabilities: Vec<String>,
        allowed_topics: Vec<String>,
        allowed_goals: Vec<String>,
        disclosure: Disclosure,
        notify: bool,
        calls_remaining: Option<i64>,
    },
    Invalid {
        valid: bool,
        error: &'static str,
    },
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct CredentialFile {
    tokens: Vec<Token>,
    contacts: Vec<Contact>,
}

struct Inner {
    tokens: Vec<Token>,
    contacts: Vec<Contact>,
}

/// The on-disk shape of `a2a-config.json`'s tier defaults, keyed by tier
/// name. A tier absent from the file falls back to the hard-coded table.
#[derive(Debug, Deserialize)]
struct OnDiskTierConfig {
    #[serde(default)]
    tier_defaults: std::collections::HashMap<String, OnDiskTierSettings>,
}

#[derive(Debug, Deserialize)]
struct OnDiskTierSettings {
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    goals: Vec<String>,
    #[serde(default)]
    capabilities: Vec<String>,
}

/// Owns the on-disk `a2a.json` credential file and the in-process mutex that
/// serialises every mutation. Validation's counter increment and the
/// contact directory's writes share this lock, matching the spec's
/// single-file-persistence atomicity guarantee.
pub struct CredentialStore {
    path: PathBuf,
    xor_key: Vec<u8>,
    inner: Mutex<Inner>,
    tier_defaults: std::collections::HashMap<String, TierSettings>,
}

impl CredentialStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let xor_key = crypto::derive_xor_key(&path.to_string_lossy());
        let inner = load_or_reset(path)?;
        let tier_config_path = path.with_file_name("a2a-config.json");
        let tier_defaults = load_tier_defaults(&tier_config_path);
        Ok(Self {
            path: path.to_path_buf(),
            xor_key,
            inner: Mutex::new(inner),
            tier_defaults,
        })
    }

    pub fn create_token(&self, req: CreateTokenRequest) -> anyhow::Result<CreatedToken> {
        let expires_in = crypto::parse_duration(&req.expires)?;
        let issued = crypto::issue_token();
        let settings = req
            .tier_settings
            .unwrap_or_else(|| self.tier_settings_for(req.tier));

        let token = Token {
            id: issued.id,
            token_hash: issued.token_hash,
            name: req.name,
            owner: req.owner,
            tier: req.tier,
            capabilities: req.capabilities.unwrap_or(settings.capabilities),
            allowed_topics: req.allowed_topics.unwrap_or(settings.topics),
            allowed_goals: req.allowed_goals.unwrap_or(settings.goals),
            disclosure: req.disclosure,
            notify: req.notify,
            max_calls: req.max_calls,
            calls_made: 0,
            expires_at: expires_in.map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
            revoked: false,
            revoked_at: None,
            created_at: Utc::now(),
            last_used: None,
        };

        let mut inner = self.inner.lock();
        inner.tokens.push(token.clone());
        persist(&self.path, &inner)?;

        Ok(CreatedToken {
            token,
            plaintext: issued.plaintext,
        })
    }

    /// Validates a plaintext token. On success atomically increments
    /// `calls_made` and updates `last_used` before returning.
    pub fn validate(&self, plaintext: &str) -> anyhow::Result<ValidationResult> {
        let hash = crypto::hash_token(plaintext);
        let mut inner = self.inner.lock();

        let Some(idx) = inner.tokens.iter().position(|t| t.token_hash == hash) else {
            return Ok(ValidationResult::Invalid {
                valid: false,
                error: TokenValidationError::TokenNotFound.as_str(),
            });
        };

        {
            let token = &inner.tokens[idx];
            if token.revoked {
                return Ok(ValidationResult::Invalid {
                    valid: false,
                    error: TokenValidationError::TokenRevoked.as_str(),
                });
            }
            if let Some(expires_at) = token.expires_at {
                if Utc::now() > expires_at {
                    return Ok(ValidationResult::Invalid {
                        valid: false,
                        error: TokenValidationError::TokenExpired.as_str(),
                    });
                }
            }
            if let Some(max) = token.max_calls {
                if token.calls_made >= max {
                    return Ok(ValidationResult::Invalid {
                        valid: false,
                        error: TokenValidationError::MaxCallsExceeded.as_str(),
                    });
                }
            }
        }

        let token = &mut inner.tokens[idx];
        token.calls_made += 1;
        token.last_used = Some(Utc::now());

        let result = ValidationResult::Valid {
            valid: true,
            id: token.id.clone(),
            name: token.name.clone(),
            tier: token.tier,
            capabilities: token.capabilities.clone(),
            allowed_topics: token.allowed_topics.clone(),
            allowed_goals: token.allowed_goals.clone(),
            disclosure: token.disclosure,
            notify: token.notify,
            calls_remaining: token.max_calls.map(|m| (m - token.calls_made).max(0)),
        };

        persist(&self.path, &inner)?;
        Ok(result)
    }

    /// `revoked` is monotonic: once true, a second revoke is a no-op.
    pub fn revoke(&self, id: &str) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock();
        let Some(token) = inner.tokens.iter_mut().find(|t| t.id == id) else {
            return Ok(false);
        };
        if !token.revoked {
            token.revoked = true;
            token.revoked_at = Some(Utc::now());
        }
        persist(&self.path, &inner)?;
        Ok(true)
    }

    /// Prefix search over token ids, for CLI/dashboard convenience only.
    /// Never used by `validate`, which always matches the full hash.
    pub fn find_by_id_prefix(&self, prefix: &str) -> Option<Token> {
        let inner = self.inner.lock();
        inner.tokens.iter().find(|t| t.id.starts_with(prefix)).cloned()
    }

    pub fn get_token(&self, id: &str) -> Option<Token> {
        let inner = self.inner.lock();
        inner.tokens.iter().find(|t| t.id == id).cloned()
    }

    pub fn list_tokens(&self) -> Vec<Token> {
        self.inner.lock().tokens.clone()
    }

    // --- contacts -----------------------------------------------------

    pub fn add_contact(&self, invite_url: &str, options: contact::AddContactOptions) -> anyhow::Result<Contact> {
        let parsed = contact::parse_invite_url(invite_url)?;
        let token_hash = crypto::hash_token(&parsed.token);
        let mut inner = self.inner.lock();

        if inner
            .contacts
            .iter()
            .any(|c| c.host == parsed.host && c.token_hash.as_deref() == Some(token_hash.as_str()))
        {
            anyhow::bail!("duplicate contact for host {} already exists", parsed.host);
        }

        let contact = Contact {
            id: format!("contact_{}", uuid::Uuid::new_v4().simple()),
            name: options.name.unwrap_or_else(|| parsed.host.clone()),
            owner: options.owner,
            host: parsed.host,
            token_hash: Some(token_hash),
            token_ciphertext: Some(crypto::xor_encrypt(&parsed.token, &self.xor_key)),
            tags: options.tags,
            fields: options.fields,
            linked_token_id: None,
            status: contact::ContactStatus::Unknown,
            last_seen: None,
            last_error: None,
            added_at: Utc::now(),
            updated_at: Utc::now(),
            is_mine: options.is_mine,
        };

        inner.contacts.push(contact.clone());
        persist(&self.path, &inner)?;
        Ok(contact)
    }

    /// Creates or refreshes the inbound placeholder contact for a caller
    /// when no outbound contact row exists for them yet.
    pub fn ensure_inbound_contact(&self, caller_name: &str, token_id: &str) -> anyhow::Result<Contact> {
        let mut inner = self.inner.lock();

        if let Some(existing) = inner
            .contacts
            .iter_mut()
            .find(|c| c.host == "inbound" && c.linked_token_id.as_deref() == Some(token_id))
        {
            existing.updated_at = Utc::now();
            let contact = existing.clone();
            persist(&self.path, &inner)?;
            return Ok(contact);
        }

        let contact = Contact {
            id: format!("contact_{}", uuid::Uuid::new_v4().simple()),
            name: caller_name.to_string(),
            owner: None,
            host: "inbound".to_string(),
            token_hash: None,
            token_ciphertext: None,
            tags: HashSet::from(["inbound".to_string()]),
            fields: Default::default(),
            linked_token_id: Some(token_id.to_string()),
            status: contact::ContactStatus::Unknown,
            last_seen: None,
            last_error: None,
            added_at: Utc::now(),
            updated_at: Utc::now(),
            is_mine: false,
        };

        inner.contacts.push(contact.clone());
        persist(&self.path, &inner)?;
        Ok(contact)
    }

    pub fn link_token_to_contact(&self, contact_id: &str, token_id: &str) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock();
        let Some(contact) = inner.contacts.iter_mut().find(|c| c.id == contact_id) else {
            return Ok(false);
        };
        contact.linked_token_id = Some(token_id.to_string());
        contact.updated_at = Utc::now();
        persist(&self.path, &inner)?;
        Ok(true)
    }

    pub fn update_contact(&self, contact_id: &str, update: contact::ContactUpdate) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock();
        let Some(contact) = inner.contacts.iter_mut().find(|c| c.id == contact_id) else {
            return Ok(false);
        };
        update.apply(contact);
        contact.updated_at = Utc::now();
        persist(&self.path, &inner)?;
        Ok(true)
    }

    pub fn remove_contact(&self, contact_id: &str) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock();
        let before = inner.contacts.len();
        inner.contacts.retain(|c| c.id != contact_id);
        let removed = inner.contacts.len() != before;
        if removed {
            persist(&self.path, &inner)?;
        }
        Ok(removed)
    }

    pub fn update_contact_status(&self, contact_id: &str, status: contact::ContactStatus, last_error: Option<String>) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock();
        let Some(contact) = inner.contacts.iter_mut().find(|c| c.id == contact_id) else {
            return Ok(false);
        };
        contact.status = status;
        contact.last_seen = Some(Utc::now());
        contact.last_error = last_error;
        contact.updated_at = Utc::now();
        persist(&self.path, &inner)?;
        Ok(true)
    }

    pub fn list_contacts(&self) -> Vec<Contact> {
        self.inner.lock().contacts.clone()
    }

    /// Decrypts the peer token stored for a contact, for outbound-call use.
    pub fn decrypt_contact_token(&self, contact: &Contact) -> anyhow::Result<Option<String>> {
        match &contact.token_ciphertext {
            Some(ct) => Ok(Some(crypto::xor_decrypt(ct, &self.xor_key)?)),
            None => Ok(None),
        }
    }

    /// Tier defaults come first from `a2a-config.json` next to the
    /// credential store, falling back to the hard-coded table for any tier
    /// the file doesn't override.
    fn tier_settings_for(&self, tier: Tier) -> TierSettings {
        self.tier_defaults
            .get(tier.as_str())
            .cloned()
            .unwrap_or_else(|| default_tier_settings(tier))
    }
}

/// Loads tier defaults from `a2a-config.json` if present and well-formed.
/// A missing or corrupt file yields an empty map, so every tier falls back
/// to [`default_tier_settings`].
fn load_tier_defaults(path: &Path) -> std::collections::HashMap<String, TierSettings> {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return std::collections::HashMap::new();
    };
    let Ok(parsed) = serde_json::from_str::<OnDiskTierConfig>(&raw) else {
        tracing::warn!(path = %path.display(), "a2a-config.json present but unparsable; using hard-coded tier defaults");
        return std::collections::HashMap::new();
    };

    parsed
        .tier_defaults
        .into_iter()
        .map(|(tier, settings)| {
            (
                tier,
                TierSettings {
                    topics: settings.topics,
                    goals: settings.goals,
                    capabilities: settings.capabilities,
                },
            )
        })
        .collect()
}

fn default_tier_settings(tier: Tier) -> TierSettings {
    match tier {
        Tier::Public => TierSettings {
            topics: vec!["general".into(), "scheduling".into()],
            goals: vec!["coordinate".into()],
            capabilities: vec!["chat".into()],
        },
        Tier::Friends => TierSettings {
            topics: vec!["architecture".into(), "debugging".into(), "research".into()],
            goals: vec!["coordinate".into(), "share-context".into()],
            capabilities: vec!["chat".into(), "context-read".into()],
        },
        Tier::Family => TierSettings {
            topics: vec![
                "architecture".into(),
                "debugging".into(),
                "code-review".into(),
                "research".into(),
                "scheduling".into(),
            ],
            goals: vec!["coordinate".into(), "share-context".into(), "co-author".into()],
            capabilities: vec!["chat".into(), "context-read".into(), "context-write".into()],
        },
        Tier::Custom => TierSettings::default(),
    }
}

fn load_or_reset(path: &Path) -> anyhow::Result<Inner> {
    if !path.exists() {
        return Ok(Inner {
            tokens: Vec::new(),
            contacts: Vec::new(),
        });
    }

    let raw = std::fs::read_to_string(path)?;
    match serde_json::from_str::<CredentialFile>(&raw) {
        // Tier's Deserialize impl already maps legacy aliases, so a store
        // written by an older version loads straight through rather than
        // tripping the corrupt-file reset below.
        Ok(file) => Ok(Inner {
            tokens: file.tokens,
            contacts: file.contacts,
        }),
        Err(e) => {
            let backup = path.with_extension(format!("json.corrupt.{}", Utc::now().timestamp()));
            tracing::error!(path = %path.display(), backup = %backup.display(), error = %e, "credential store corrupt; renaming aside and restarting empty");
            std::fs::rename(path, &backup)?;
            Ok(Inner {
                tokens: Vec::new(),
                contacts: Vec::new(),
            })
        }
    }
}

fn persist(path: &Path, inner: &Inner) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = CredentialFile {
        tokens: inner.tokens.clone(),
        contacts: inner.contacts.clone(),
    };
    let serialized = serde_json::to_string_pretty(&file)?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, serialized)?;
    set_owner_only_mode(&tmp_path);
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(unix)]
fn set_owner_only_mode(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = std::fs::metadata(path) {
        let mut perms = metadata.permissions();
        perms.set_mode(0o600);
        let _ = std::fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn set_owner_only_mode(_path: &Path) {}

pub type SharedCredentialStore = Arc<CredentialStore>;

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("a2a-test-{}.json", uuid::Uuid::new_v4()));
        p
    }

    #[test]
    fn create_and_validate_round_trip() {
        let path = temp_path();
        let store = CredentialStore::open(&path).unwrap();

        let created = store
            .create_token(CreateTokenRequest {
                name: "Golda".into(),
                owner: "me".into(),
                expires: "never".into(),
                tier: Tier::Friends,
                max_calls: Some(50),
                ..Default::default()
            })
            .unwrap();

        match store.validate(&created.plaintext).unwrap() {
            ValidationResult::Valid { calls_remaining, .. } => {
                assert_eq!(calls_remaining, Some(49));
            }
            ValidationResult::Invalid { .. } => panic!("expected valid"),
        }

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains(&created.plaintext), "plaintext must never be persisted");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn max_calls_exhausted_after_limit() {
        let path = temp_path();
        let store = CredentialStore::open(&path).unwrap();
        let created = store
            .create_token(CreateTokenRequest {
                name: "Limited".into(),
                owner: "me".into(),
                expires: "never".into(),
                max_calls: Some(2),
                ..Default::default()
            })
            .unwrap();

        store.validate(&created.plaintext).unwrap();
        store.validate(&created.plaintext).unwrap();
        let third = store.validate(&created.plaintext).unwrap();
        assert!(matches!(
            third,
            ValidationResult::Invalid { error, .. } if error == "max_calls_exceeded"
        ));

        let token = store.get_token(&created.token.id).unwrap();
        assert_eq!(token.calls_made, 2);
        assert!(!token.revoked);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn revoke_is_monotonic() {
        let path = temp_path();
        let store = CredentialStore::open(&path).unwrap();
        let created = store
            .create_token(CreateTokenRequest {
                name: "Revoked".into(),
                owner: "me".into(),
                expires: "never".into(),
                ..Default::default()
            })
            .unwrap();

        store.revoke(&created.token.id).unwrap();
        let first_revoked_at = store.get_token(&created.token.id).unwrap().revoked_at;
        store.revoke(&created.token.id).unwrap();
        let second_revoked_at = store.get_token(&created.token.id).unwrap().revoked_at;
        assert_eq!(first_revoked_at, second_revoked_at);

        let result = store.validate(&created.plaintext).unwrap();
        assert!(matches!(result, ValidationResult::Invalid { error, .. } if error == "token_revoked"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn on_disk_tier_config_overrides_hard_coded_defaults() {
        let path = temp_path();
        let config_path = path.with_file_name("a2a-config.json");
        std::fs::write(
            &config_path,
            r#"{"tier_defaults": {"public": {"topics": ["weather"], "goals": ["small-talk"], "capabilities": ["chat"]}}}"#,
        )
        .unwrap();

        let store = CredentialStore::open(&path).unwrap();
        let created = store
            .create_token(CreateTokenRequest {
                name: "Overridden".into(),
                owner: "me".into(),
                expires: "never".into(),
                tier: Tier::Public,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(created.token.allowed_topics, vec!["weather".to_string()]);
        assert_eq!(created.token.allowed_goals, vec!["small-talk".to_string()]);

        std::fs::remove_file(&path).ok();
        std::fs::remove_file(&config_path).ok();
    }

    #[test]
    fn legacy_tier_names_load_instead_of_tripping_corrupt_reset() {
        let path = temp_path();
        let legacy = r#"{
            "tokens": [{
                "id": "tok_legacy",
                "token_hash": "deadbeef",
                "name": "Legacy",
                "owner": "me",
                "tier": "chat-only",
                "capabilities": [],
                "allowed_topics": [],
                "allowed_goals": [],
                "disclosure": "none",
                "notify": false,
                "max_calls": null,
                "calls_made": 0,
                "expires_at": null,
                "revoked": false,
                "revoked_at": null,
                "created_at": "2024-01-01T00:00:00Z",
                "last_used": null
            }],
            "contacts": []
        }"#;
        std::fs::write(&path, legacy).unwrap();

        let store = CredentialStore::open(&path).unwrap();
        let tokens = store.list_tokens();
        assert_eq!(tokens.len(), 1, "legacy store must load, not reset as corrupt");
        assert_eq!(tokens[0].tier, Tier::Public);

        let backup = path.with_extension("json.corrupt.0");
        assert!(!backup.exists());

        std::fs::remove_file(&path).ok();
    }
}
