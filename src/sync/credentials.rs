use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::db::models::CredentialState;
use crate::db::Database;
use crate::mail::RefreshedToken;

pub const CREDENTIAL_KEY_ENV: &str = "JOBTRAIL_CREDENTIAL_KEY";
const CREDENTIAL_KEY_BYTES: usize = 32;
const CREDENTIAL_NONCE_BYTES: usize = 12;
const CREDENTIAL_ENVELOPE_VERSION: u8 = 1;

/// Refresh slightly ahead of the provider's expiry to avoid a token dying
/// mid-run.
const EXPIRY_SKEW_SECONDS: i64 = 60;

impl CredentialState {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match DateTime::parse_from_rfc3339(&self.token_expiry) {
            Ok(expiry) => expiry.with_timezone(&Utc) <= now,
            // Unreadable expiry counts as expired.
            Err(_) => true,
        }
    }

    /// New credential state after a token refresh. The previous state is
    /// left untouched; callers persist and thread the returned value.
    pub fn with_refreshed(&self, token: &RefreshedToken, now: DateTime<Utc>) -> Self {
        let expiry = now + Duration::seconds(token.expires_in_seconds.saturating_sub(EXPIRY_SKEW_SECONDS));
        Self {
            access_token: token.access_token.clone(),
            token_expiry: expiry.to_rfc3339_opts(SecondsFormat::Secs, true),
            ..self.clone()
        }
    }
}

/// Load an owner's credential record, decrypting tokens when the at-rest
/// encryption key is configured. Plaintext values written before the key
/// existed are accepted as-is.
pub fn load_credentials(db: &Database, owner_id: &str) -> Result<Option<CredentialState>> {
    let Some(mut creds) = db
        .get_credentials(owner_id)
        .with_context(|| format!("read sync credentials for owner {owner_id}"))?
    else {
        return Ok(None);
    };

    if let Some(key) = encryption_key()? {
        creds.access_token = unseal_secret(&creds.access_token, &key, "access token");
        creds.refresh_token = unseal_secret(&creds.refresh_token, &key, "refresh token");
    }

    Ok(Some(creds))
}

/// Persist an owner's credential record, encrypting tokens when the key is
/// configured. Without a key the tokens are stored as given.
pub fn save_credentials(db: &Database, creds: &CredentialState) -> Result<()> {
    let mut to_store = creds.clone();

    if let Some(key) = encryption_key()? {
        to_store.access_token =
            seal_secret(&creds.access_token, &key).context("encrypt access token")?;
        to_store.refresh_token =
            seal_secret(&creds.refresh_token, &key).context("encrypt refresh token")?;
    }

    db.save_credentials(&to_store)
        .with_context(|| format!("write sync credentials for owner {}", creds.owner_id))
}

fn unseal_secret(raw: &str, key: &[u8; CREDENTIAL_KEY_BYTES], what: &str) -> String {
    if !looks_like_envelope(raw) {
        return raw.to_string();
    }
    match open_envelope(raw, key) {
        Ok(plain) => plain,
        Err(error) => {
            warn!("failed to decrypt stored {what}: {error}; using raw value");
            raw.to_string()
        }
    }
}

fn encryption_key() -> Result<Option<[u8; CREDENTIAL_KEY_BYTES]>> {
    let raw = std::env::var(CREDENTIAL_KEY_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    raw.map(|value| parse_key_hex(&value))
        .transpose()
        .with_context(|| format!("{CREDENTIAL_KEY_ENV} must be 64 hex characters (32 bytes)"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SecretEnvelope {
    version: u8,
    nonce_hex: String,
    ciphertext_hex: String,
}

fn looks_like_envelope(raw: &str) -> bool {
    serde_json::from_str::<SecretEnvelope>(raw).is_ok()
}

fn seal_secret(plain: &str, key_bytes: &[u8; CREDENTIAL_KEY_BYTES]) -> Result<String> {
    let mut plaintext = plain.as_bytes().to_vec();

    let unbound_key = UnboundKey::new(&AES_256_GCM, key_bytes)
        .map_err(|_| anyhow!("construct AES-256-GCM key"))?;
    let key = LessSafeKey::new(unbound_key);

    let mut nonce_bytes = [0u8; CREDENTIAL_NONCE_BYTES];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| anyhow!("generate random nonce for credential encryption"))?;

    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::empty(),
        &mut plaintext,
    )
    .map_err(|_| anyhow!("encrypt credential secret"))?;

    let envelope = SecretEnvelope {
        version: CREDENTIAL_ENVELOPE_VERSION,
        nonce_hex: hex_encode(&nonce_bytes),
        ciphertext_hex: hex_encode(&plaintext),
    };

    serde_json::to_string(&envelope).context("serialize credential envelope")
}

fn open_envelope(raw: &str, key_bytes: &[u8; CREDENTIAL_KEY_BYTES]) -> Result<String> {
    let envelope: SecretEnvelope =
        serde_json::from_str(raw).context("parse credential envelope")?;

    if envelope.version != CREDENTIAL_ENVELOPE_VERSION {
        return Err(anyhow!(
            "unsupported credential envelope version {}",
            envelope.version
        ));
    }

    let nonce_vec = hex_decode(&envelope.nonce_hex).context("decode envelope nonce")?;
    let nonce_bytes: [u8; CREDENTIAL_NONCE_BYTES] = nonce_vec
        .try_into()
        .map_err(|_| anyhow!("invalid nonce length in credential envelope"))?;
    let mut ciphertext =
        hex_decode(&envelope.ciphertext_hex).context("decode envelope ciphertext")?;

    let unbound_key = UnboundKey::new(&AES_256_GCM, key_bytes)
        .map_err(|_| anyhow!("construct AES-256-GCM key"))?;
    let key = LessSafeKey::new(unbound_key);

    let plaintext = key
        .open_in_place(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::empty(),
            &mut ciphertext,
        )
        .map_err(|_| anyhow!("decrypt credential secret"))?;

    String::from_utf8(plaintext.to_vec()).context("decrypted credential is not UTF-8")
}

fn parse_key_hex(raw: &str) -> Result<[u8; CREDENTIAL_KEY_BYTES]> {
    let decoded = hex_decode(raw).context("decode credential key hex")?;
    decoded
        .try_into()
        .map_err(|_| anyhow!("credential key must be 32 bytes"))
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

fn hex_decode(raw: &str) -> Result<Vec<u8>> {
    let value = raw.trim();
    if value.len() % 2 != 0 {
        return Err(anyhow!("hex string length must be even"));
    }

    let mut out = Vec::with_capacity(value.len() / 2);
    let bytes = value.as_bytes();
    let mut idx = 0usize;
    while idx < bytes.len() {
        let hi = decode_hex_nibble(bytes[idx]).ok_or_else(|| anyhow!("invalid hex digit"))?;
        let lo = decode_hex_nibble(bytes[idx + 1]).ok_or_else(|| anyhow!("invalid hex digit"))?;
        out.push((hi << 4) | lo);
        idx += 2;
    }
    Ok(out)
}

fn decode_hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{open_envelope, seal_secret};
    use crate::db::models::CredentialState;
    use crate::mail::RefreshedToken;

    fn creds(expiry: &str) -> CredentialState {
        CredentialState {
            owner_id: "owner-1".to_string(),
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            token_expiry: expiry.to_string(),
            sync_enabled: true,
            last_sync_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn expiry_comparison() {
        let now = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        assert!(creds("2026-01-09T00:00:00Z").is_expired(now));
        assert!(!creds("2026-01-11T00:00:00Z").is_expired(now));
    }

    #[test]
    fn unparseable_expiry_counts_as_expired() {
        let now = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        assert!(creds("not-a-date").is_expired(now));
    }

    #[test]
    fn refresh_produces_new_state_without_touching_refresh_token() {
        let now = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        let old = creds("2026-01-09T00:00:00Z");
        let renewed = old.with_refreshed(
            &RefreshedToken {
                access_token: "fresh-access".to_string(),
                expires_in_seconds: 3_600,
            },
            now,
        );

        assert_eq!(renewed.access_token, "fresh-access");
        assert_eq!(renewed.refresh_token, "refresh");
        assert_eq!(renewed.token_expiry, "2026-01-10T00:59:00Z");
        assert_eq!(old.access_token, "access");
    }

    #[test]
    fn seal_and_open_round_trip() {
        let key = [7u8; 32];
        let sealed = seal_secret("super-secret-token", &key).expect("seal");
        assert!(sealed.contains("ciphertext_hex"));
        let opened = open_envelope(&sealed, &key).expect("open");
        assert_eq!(opened, "super-secret-token");
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let sealed = seal_secret("super-secret-token", &[7u8; 32]).expect("seal");
        assert!(open_envelope(&sealed, &[9u8; 32]).is_err());
    }
}
