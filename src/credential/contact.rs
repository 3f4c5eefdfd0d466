// src/credential/contact.rs
// The contact directory: known remote peers, keyed by (host, token_hash).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    Unknown,
    Online,
    Offline,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub owner: Option<String>,
    pub host: String,
    pub token_hash: Option<String>,
    pub token_ciphertext: Option<String>,
    pub tags: HashSet<String>,
    pub fields: HashMap<String, String>,
    pub linked_token_id: Option<String>,
    pub status: ContactStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// True when this contact is another of the owner's own agents.
    pub is_mine: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AddContactOptions {
    pub name: Option<String>,
    pub owner: Option<String>,
    pub tags: HashSet<String>,
    pub fields: HashMap<String, String>,
    pub is_mine: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ContactUpdate {
    pub name: Option<String>,
    pub tags: Option<HashSet<String>>,
    pub fields: Option<HashMap<String, String>>,
}

impl ContactUpdate {
    pub fn apply(self, contact: &mut Contact) {
        if let Some(name) = self.name {
            contact.name = name;
        }
        if let Some(tags) = self.tags {
            contact.tags = tags;
        }
        if let Some(fields) = self.fields {
            contact.fields = fields;
        }
    }
}

pub struct ParsedInvite {
    pub host: String,
    pub token: String,
}

/// Parses `a2a://<host>[:port]/<token>`. The legacy `oclaw://` scheme is
/// accepted on read but never emitted; any other scheme is rejected.
pub fn parse_invite_url(invite_url: &str) -> anyhow::Result<ParsedInvite> {
    let rest = invite_url
        .strip_prefix("a2a://")
        .or_else(|| invite_url.strip_prefix("oclaw://"))
        .ok_or_else(|| anyhow::anyhow!("malformed invite url: unsupported scheme"))?;

    let (host, token) = rest
        .split_once('/')
        .ok_or_else(|| anyhow::anyhow!("malformed invite url: missing token segment"))?;

    if host.is_empty() || token.is_empty() {
        anyhow::bail!("malformed invite url: empty host or token");
    }

    Ok(ParsedInvite {
        host: host.to_string(),
        token: token.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a2a_scheme() {
        let parsed = parse_invite_url("a2a://peer.example.com:8080/fed_abc123").unwrap();
        assert_eq!(parsed.host, "peer.example.com:8080");
        assert_eq!(parsed.token, "fed_abc123");
    }

    #[test]
    fn accepts_legacy_oclaw_scheme_on_read() {
        let parsed = parse_invite_url("oclaw://peer.example.com/fed_abc123").unwrap();
        assert_eq!(parsed.host, "peer.example.com");
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(parse_invite_url("https://peer.example.com/fed_abc123").is_err());
    }
}
