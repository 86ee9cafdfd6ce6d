//! API-key secret encryption.
//!
//! Secrets are sealed with an HMAC-SHA256 keystream in counter mode under
//! a process-wide secret. The plaintext is never persisted; the catalog
//! decrypts only when the gateway is about to use the key.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::error::{CatalogError, CatalogResult};

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 16;

/// Keystream cipher bound to a process secret.
#[derive(Clone)]
pub struct SecretCipher {
    key: Vec<u8>,
}

impl SecretCipher {
    pub fn new(process_secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: process_secret.as_ref().to_vec(),
        }
    }

    /// From the `CATALOG_SECRET_KEY` environment variable.
    pub fn from_env() -> CatalogResult<Self> {
        let secret = std::env::var("CATALOG_SECRET_KEY")
            .map_err(|_| CatalogError::Backend("CATALOG_SECRET_KEY not set".into()))?;
        Ok(Self::new(secret))
    }

    fn keystream_block(&self, nonce: &[u8], counter: u32) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(nonce);
        mac.update(&counter.to_be_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    fn apply_keystream(&self, nonce: &[u8], data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        for (block_index, chunk) in data.chunks(32).enumerate() {
            let block = self.keystream_block(nonce, block_index as u32);
            for (byte, key_byte) in chunk.iter().zip(block.iter()) {
                out.push(byte ^ key_byte);
            }
        }
        out
    }

    /// Seal a plaintext secret; the output is safe to persist.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let nonce = Uuid::new_v4().into_bytes();
        let cipher = self.apply_keystream(&nonce, plaintext.as_bytes());
        let mut payload = Vec::with_capacity(NONCE_LEN + cipher.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&cipher);
        base64::engine::general_purpose::STANDARD.encode(payload)
    }

    /// Open a sealed secret.
    pub fn decrypt(&self, ciphertext: &str) -> CatalogResult<String> {
        let payload = base64::engine::general_purpose::STANDARD
            .decode(ciphertext.as_bytes())
            .map_err(|e| CatalogError::Crypto(e.to_string()))?;
        if payload.len() < NONCE_LEN {
            return Err(CatalogError::Crypto("ciphertext too short".into()));
        }
        let (nonce, cipher) = payload.split_at(NONCE_LEN);
        let plain = self.apply_keystream(nonce, cipher);
        String::from_utf8(plain).map_err(|e| CatalogError::Crypto(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let cipher = SecretCipher::new("process-secret");
        let sealed = cipher.encrypt("sk-live-abc123");
        assert_ne!(sealed, "sk-live-abc123");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "sk-live-abc123");
    }

    #[test]
    fn fresh_nonce_per_seal() {
        let cipher = SecretCipher::new("process-secret");
        assert_ne!(cipher.encrypt("same"), cipher.encrypt("same"));
    }

    #[test]
    fn wrong_key_does_not_recover_plaintext() {
        let sealed = SecretCipher::new("key-a").encrypt("topsecret");
        let opened = SecretCipher::new("key-b").decrypt(&sealed);
        match opened {
            Ok(text) => assert_ne!(text, "topsecret"),
            Err(_) => {}
        }
    }

    #[test]
    fn garbage_ciphertext_is_rejected() {
        let cipher = SecretCipher::new("k");
        assert!(cipher.decrypt("@@@not-base64@@@").is_err());
        assert!(cipher.decrypt("c2hvcnQ=").is_err());
    }
}
