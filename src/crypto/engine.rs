//! Sealing for OAuth tokens stored in `social_tokens`.
//!
//! A sealed value is `v1.` followed by base64(nonce || ciphertext). The owning
//! account id is bound as associated data, so a value copied into another
//! account's row does not open.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::AppError;

const NONCE_LEN: usize = 12;
const SEALED_PREFIX: &str = "v1.";

pub struct CryptoEngine {
    cipher: Aes256Gcm,
}

impl CryptoEngine {
    /// Build the engine from the base64 `MASTER_KEY` (32 bytes once decoded).
    pub fn new(master_key_b64: &str) -> Result<Self, AppError> {
        let key = STANDARD
            .decode(master_key_b64.trim())
            .map_err(|e| AppError::Crypto(format!("Invalid MASTER_KEY base64: {e}")))?;
        if key.len() != 32 {
            return Err(AppError::Crypto(format!(
                "MASTER_KEY must decode to 32 bytes, got {}",
                key.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| AppError::Crypto(format!("Failed to init AES cipher: {e}")))?;
        Ok(Self { cipher })
    }

    pub fn seal(&self, account_id: &str, token: &str) -> Result<String, AppError> {
        let nonce: [u8; NONCE_LEN] = rand::random();
        let sealed = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: token.as_bytes(),
                    aad: account_id.as_bytes(),
                },
            )
            .map_err(|_| AppError::Crypto(format!("failed to seal token for account {account_id}")))?;

        let mut raw = Vec::with_capacity(NONCE_LEN + sealed.len());
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&sealed);
        Ok(format!("{SEALED_PREFIX}{}", STANDARD.encode(raw)))
    }

    /// Seal an optional refresh token. Absent and empty tokens stay NULL.
    pub fn seal_opt(&self, account_id: &str, token: Option<&str>) -> Result<Option<String>, AppError> {
        token
            .filter(|t| !t.is_empty())
            .map(|t| self.seal(account_id, t))
            .transpose()
    }

    pub fn open(&self, account_id: &str, sealed: &str) -> Result<String, AppError> {
        let encoded = sealed
            .strip_prefix(SEALED_PREFIX)
            .ok_or_else(|| AppError::Crypto("unrecognized sealed token format".into()))?;
        let raw = STANDARD
            .decode(encoded)
            .map_err(|e| AppError::Crypto(format!("Invalid sealed token base64: {e}")))?;
        if raw.len() <= NONCE_LEN {
            return Err(AppError::Crypto("sealed token too short".into()));
        }

        let (nonce, body) = raw.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: body,
                    aad: account_id.as_bytes(),
                },
            )
            .map_err(|_| AppError::Crypto(format!("token for account {account_id} failed to open")))?;

        String::from_utf8(plain)
            .map_err(|e| AppError::Crypto(format!("sealed token is not UTF-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> CryptoEngine {
        CryptoEngine::new(&STANDARD.encode([0x42u8; 32])).unwrap()
    }

    #[test]
    fn test_sealed_token_opens_for_its_account() {
        let engine = engine();
        let sealed = engine.seal("acct-1", "AQX-linkedin-access-token").unwrap();

        assert!(sealed.starts_with("v1."));
        assert!(!sealed.contains("AQX"));
        assert_eq!(engine.open("acct-1", &sealed).unwrap(), "AQX-linkedin-access-token");
    }

    #[test]
    fn test_sealing_twice_differs() {
        let engine = engine();
        assert_ne!(
            engine.seal("acct-1", "same").unwrap(),
            engine.seal("acct-1", "same").unwrap()
        );
    }

    #[test]
    fn test_token_moved_to_other_account_does_not_open() {
        let engine = engine();
        let sealed = engine.seal("acct-1", "r1").unwrap();
        assert!(matches!(engine.open("acct-2", &sealed), Err(AppError::Crypto(_))));
    }

    #[test]
    fn test_tampered_or_unprefixed_value_rejected() {
        let engine = engine();
        let sealed = engine.seal("acct-1", "r1").unwrap();

        let mut raw = STANDARD.decode(&sealed[3..]).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = format!("v1.{}", STANDARD.encode(&raw));

        assert!(engine.open("acct-1", &tampered).is_err());
        assert!(engine.open("acct-1", &sealed[3..]).is_err());
    }

    #[test]
    fn test_rejects_short_key() {
        let key = STANDARD.encode([0x42u8; 16]);
        assert!(matches!(CryptoEngine::new(&key), Err(AppError::Crypto(_))));
    }

    #[test]
    fn test_seal_opt_skips_empty() {
        let engine = engine();
        assert!(engine.seal_opt("acct-1", None).unwrap().is_none());
        assert!(engine.seal_opt("acct-1", Some("")).unwrap().is_none());
        assert!(engine.seal_opt("acct-1", Some("r1")).unwrap().is_some());
    }
}
