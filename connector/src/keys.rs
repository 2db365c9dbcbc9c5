use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use argon2::Argon2;
use ed25519_dalek::SigningKey;

use crate::error::ConnectorError;

const SCHEME: &str = "argon2id";
const NONCE_LENGTH: usize = 12;
const SEED_LENGTH: usize = 32;

/// Decrypt the relayer signing key from its
/// `argon2id$<salt-hex>$<nonce-hex>$<ciphertext-hex>` envelope.
///
/// # Errors
/// * malformed envelope
/// * wrong password or tampered ciphertext
pub fn decrypt_private_key(encrypted: &str, password: &str) -> Result<SigningKey, ConnectorError> {
    let parts: Vec<&str> = encrypted.split('$').collect();
    let &[scheme, salt_hex, nonce_hex, ciphertext_hex] = parts.as_slice() else {
        return Err(ConnectorError::Key(
            "expected argon2id$<salt>$<nonce>$<ciphertext>".to_string(),
        ));
    };
    if scheme != SCHEME {
        return Err(ConnectorError::Key(format!(
            "unsupported key derivation scheme {scheme}"
        )));
    }

    let salt = decode_hex_part(salt_hex, "salt")?;
    let nonce = decode_hex_part(nonce_hex, "nonce")?;
    let ciphertext = decode_hex_part(ciphertext_hex, "ciphertext")?;
    if nonce.len() != NONCE_LENGTH {
        return Err(ConnectorError::Key("nonce must be 12 bytes".to_string()));
    }

    let cipher = Aes256Gcm::new_from_slice(&derive_key(password, &salt)?)
        .map_err(|e| ConnectorError::Key(e.to_string()))?;
    let seed = cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|_| ConnectorError::Key("wrong password or corrupted key".to_string()))?;

    let seed: [u8; SEED_LENGTH] = seed
        .try_into()
        .map_err(|_| ConnectorError::Key("decrypted seed must be 32 bytes".to_string()))?;
    Ok(SigningKey::from_bytes(&seed))
}

/// Produce the encrypted envelope consumed by [`decrypt_private_key`].
///
/// # Errors
/// * key derivation failure
pub fn encrypt_private_key(
    seed: &[u8; SEED_LENGTH],
    password: &str,
    salt: &[u8; 16],
    nonce: &[u8; NONCE_LENGTH],
) -> Result<String, ConnectorError> {
    let cipher = Aes256Gcm::new_from_slice(&derive_key(password, salt)?)
        .map_err(|e| ConnectorError::Key(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(nonce), seed.as_ref())
        .map_err(|e| ConnectorError::Key(e.to_string()))?;

    Ok(format!(
        "{SCHEME}${}${}${}",
        hex::encode(salt),
        hex::encode(nonce),
        hex::encode(ciphertext)
    ))
}

fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; 32], ConnectorError> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| ConnectorError::Key(e.to_string()))?;
    Ok(key)
}

fn decode_hex_part(part: &str, name: &str) -> Result<Vec<u8>, ConnectorError> {
    hex::decode(part).map_err(|_| ConnectorError::Key(format!("{name} is not valid hex")))
}
