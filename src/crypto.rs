//! Credential-at-rest encryption (spec §6, invariant 5).
//!
//! AES-256-CBC keyed by PBKDF2-SHA256 (10,000 iterations, a fixed
//! application salt) over a machine identifier. Grounded on the RustCrypto
//! stack (`aes`, `cbc`, `pbkdf2`, `sha2`) as used by denoland-deno's crypto
//! subsystem in the reference pack; `base64` and `rand` come from the same
//! family of crates used for credential/secret handling in mofeng-git-One-KVM.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use std::path::Path;

use crate::error::{CryptoError, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const PBKDF2_ITERATIONS: u32 = 10_000;
const APP_SALT: &[u8] = b"acproxycam-config-v1";
const ENCRYPTED_PREFIX: &str = "encrypted:";
const IV_LEN: usize = 16;

/// Derives the AES-256 key from a machine identifier, once per process.
pub struct CredentialCipher {
    key: [u8; 32],
}

impl CredentialCipher {
    pub fn from_machine_id() -> Result<Self> {
        let machine_id = read_machine_id()?;
        Ok(Self::from_secret(machine_id.as_bytes()))
    }

    pub fn from_secret(secret: &[u8]) -> Self {
        let mut key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(secret, APP_SALT, PBKDF2_ITERATIONS, &mut key);
        Self { key }
    }

    /// Encrypts `plaintext`, returning `encrypted:<base64(iv || ciphertext)>`.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut payload = Vec::with_capacity(IV_LEN + ciphertext.len());
        payload.extend_from_slice(&iv);
        payload.extend_from_slice(&ciphertext);

        format!("{ENCRYPTED_PREFIX}{}", STANDARD.encode(payload))
    }

    /// Decrypts a value produced by [`encrypt`](Self::encrypt). Values
    /// without the `encrypted:` sentinel are treated as legacy plaintext and
    /// returned unchanged (spec §6: "plaintext on first read by an older
    /// config").
    pub fn decrypt_field(&self, stored: &str) -> Result<String> {
        let Some(b64) = stored.strip_prefix(ENCRYPTED_PREFIX) else {
            return Ok(stored.to_string());
        };

        let payload = STANDARD
            .decode(b64)
            .map_err(|e| CryptoError::Base64(e.to_string()))?;

        if payload.len() < IV_LEN {
            return Err(CryptoError::MalformedCiphertext.into());
        }
        let (iv, ciphertext) = payload.split_at(IV_LEN);

        let plaintext = Aes256CbcDec::new(&self.key.into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed.into())
    }

    pub fn is_encrypted(value: &str) -> bool {
        value.starts_with(ENCRYPTED_PREFIX)
    }
}

/// Reads a stable machine identifier, preferring `/etc/machine-id`, then
/// `/var/lib/dbus/machine-id`, then the hostname, exactly as spec §6 orders
/// the preference.
fn read_machine_id() -> Result<String> {
    for candidate in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
        if let Ok(contents) = std::fs::read_to_string(Path::new(candidate)) {
            let trimmed = contents.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }
    }

    if let Ok(hostname) = std::fs::read_to_string("/etc/hostname") {
        let trimmed = hostname.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    Err(CryptoError::NoMachineId.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_under_fixed_secret() {
        let cipher = CredentialCipher::from_secret(b"test-machine-id");
        for s in ["", "hunter2", "a longer password with spaces!@#"] {
            let encrypted = cipher.encrypt(s);
            assert!(CredentialCipher::is_encrypted(&encrypted));
            let decrypted = cipher.decrypt_field(&encrypted).unwrap();
            assert_eq!(decrypted, s);
        }
    }

    #[test]
    fn plaintext_passthrough_for_legacy_values() {
        let cipher = CredentialCipher::from_secret(b"test-machine-id");
        let decrypted = cipher.decrypt_field("plain-password").unwrap();
        assert_eq!(decrypted, "plain-password");
    }

    #[test]
    fn distinct_ivs_for_repeated_encryption() {
        let cipher = CredentialCipher::from_secret(b"test-machine-id");
        let a = cipher.encrypt("same-value");
        let b = cipher.encrypt("same-value");
        assert_ne!(a, b, "IVs must differ across encryptions");
        assert_eq!(cipher.decrypt_field(&a).unwrap(), "same-value");
        assert_eq!(cipher.decrypt_field(&b).unwrap(), "same-value");
    }

    #[test]
    fn malformed_ciphertext_is_rejected() {
        let cipher = CredentialCipher::from_secret(b"test-machine-id");
        let err = cipher.decrypt_field("encrypted:not-valid-base64!!").unwrap_err();
        assert!(matches!(
            err,
            crate::error::AcproxycamError::Crypto(CryptoError::Base64(_))
        ));
    }
}
