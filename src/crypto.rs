// src/crypto.rs
// Token generation, hashing, and at-rest obfuscation for the credential store.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use thiserror::Error;

use crate::utils::sha256_hash_bytes;

const TOKEN_PREFIX: &str = "fed_";
const TOKEN_BYTES: usize = 24;
const ID_BYTES: usize = 16;

/// A freshly issued plaintext token plus the opaque id it is filed under.
/// The plaintext only ever exists here and in the response to `create`.
pub struct IssuedToken {
    pub id: String,
    pub plaintext: String,
    pub token_hash: String,
}

/// Generates a new token: 24 random bytes, URL-safe base64 without padding,
/// prefixed `fed_`. The id is independent random bytes, not derived from the
/// token, so prefix-based enumeration of ids reveals nothing about tokens.
pub fn issue_token() -> IssuedToken {
    let mut rng = rand::rng();

    let mut token_bytes = [0u8; TOKEN_BYTES];
    rng.fill_bytes(&mut token_bytes);
    let plaintext = format!("{TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(token_bytes));

    let mut id_bytes = [0u8; ID_BYTES];
    rng.fill_bytes(&mut id_bytes);
    let id = URL_SAFE_NO_PAD.encode(id_bytes);

    let token_hash = sha256_hash_bytes(plaintext.as_bytes());

    IssuedToken {
        id,
        plaintext,
        token_hash,
    }
}

pub fn hash_token(plaintext: &str) -> String {
    sha256_hash_bytes(plaintext.as_bytes())
}

/// XOR-with-derived-key obfuscation for peer tokens stored in the contact
/// directory. This is deliberately NOT authenticated encryption: it keeps a
/// plaintext peer token out of plain sight on disk, nothing more. The key is
/// derived once per store from `sha256(store_path || "remote-key")`.
pub fn derive_xor_key(store_path: &str) -> Vec<u8> {
    let mut material = String::with_capacity(store_path.len() + 10);
    material.push_str(store_path);
    material.push_str("remote-key");
    hex_to_bytes(&sha256_hash_bytes(material.as_bytes()))
}

fn hex_to_bytes(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .filter_map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

pub fn xor_encrypt(plaintext: &str, key: &[u8]) -> String {
    let xored: Vec<u8> = plaintext
        .as_bytes()
        .iter()
        .enumerate()
        .map(|(i, b)| b ^ key[i % key.len()])
        .collect();
    URL_SAFE_NO_PAD.encode(xored)
}

pub fn xor_decrypt(ciphertext: &str, key: &[u8]) -> anyhow::Result<String> {
    let bytes = URL_SAFE_NO_PAD.decode(ciphertext)?;
    let xored: Vec<u8> = bytes
        .iter()
        .enumerate()
        .map(|(i, b)| b ^ key[i % key.len()])
        .collect();
    Ok(String::from_utf8(xored)?)
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid duration string: {0}")]
pub struct InvalidDuration(pub String);

/// Parses `<n>h`, `<n>d`, or `never` into a duration in seconds from now
/// (`None` for `never`). Any other shape is a validation error at issuance.
pub fn parse_duration(input: &str) -> Result<Option<i64>, InvalidDuration> {
    if input == "never" {
        return Ok(None);
    }
    let (n, unit) = input.split_at(input.len().saturating_sub(1));
    let n: i64 = n
        .parse()
        .map_err(|_| InvalidDuration(input.to_string()))?;
    if n < 0 {
        return Err(InvalidDuration(input.to_string()));
    }
    match unit {
        "h" => Ok(Some(n * 3600)),
        "d" => Ok(Some(n * 86400)),
        _ => Err(InvalidDuration(input.to_string())),
    }
}

/// Inverse of [`parse_duration`], used only to satisfy the round-trip law;
/// always emits hours for values under a day, days otherwise.
pub fn format_duration(seconds: Option<i64>) -> String {
    match seconds {
        None => "never".to_string(),
        Some(s) if s % 86400 == 0 => format!("{}d", s / 86400),
        Some(s) => format!("{}h", s / 3600),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_have_prefix_and_independent_id() {
        let t = issue_token();
        assert!(t.plaintext.starts_with(TOKEN_PREFIX));
        assert_eq!(t.token_hash, hash_token(&t.plaintext));
        assert!(!t.plaintext.contains(&t.id));
    }

    #[test]
    fn duration_parses_hours_days_and_never() {
        assert_eq!(parse_duration("24h").unwrap(), Some(24 * 3600));
        assert_eq!(parse_duration("7d").unwrap(), Some(7 * 86400));
        assert_eq!(parse_duration("never").unwrap(), None);
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("-1h").is_err());
    }

    #[test]
    fn duration_round_trips_through_format() {
        for repr in ["24h", "7d", "never"] {
            let parsed = parse_duration(repr).unwrap();
            let reparsed = parse_duration(&format_duration(parsed)).unwrap();
            assert_eq!(parsed, reparsed);
        }
    }

    #[test]
    fn xor_round_trips() {
        let key = derive_xor_key("/tmp/a2a.json");
        let ct = xor_encrypt("fed_secretpeertoken", &key);
        assert_ne!(ct, "fed_secretpeertoken");
        assert_eq!(xor_decrypt(&ct, &key).unwrap(), "fed_secretpeertoken");
    }
}
