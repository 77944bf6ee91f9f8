//! Chunked RSA encryption of request bodies.
//!
//! PKCS#1 v1.5 can only seal `key_size - 11` bytes per block, so larger
//! payloads are split into blocks and concatenated as
//! `[u16 big-endian ciphertext length][ciphertext]` tuples. A payload that
//! fits a single block travels unframed.

use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use std::path::Path;

/// Header marking a request body as RSA-encrypted.
pub const ENCRYPTED_HEADER: &str = "X-Encrypted";

/// PKCS#1 v1.5 padding overhead in bytes.
const PKCS1_OVERHEAD: usize = 11;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("failed to read key file {path}: {source}")]
    ReadKey {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse PEM key: {0}")]
    ParseKey(String),
    #[error("RSA operation failed: {0}")]
    Rsa(#[from] rsa::Error),
    #[error("invalid encrypted payload: {0}")]
    Malformed(&'static str),
}

/// Loads an RSA public key from a PEM file (PKCS#8/SPKI or PKCS#1).
pub fn load_public_key(path: &Path) -> Result<RsaPublicKey, CryptoError> {
    let pem = std::fs::read_to_string(path).map_err(|source| CryptoError::ReadKey {
        path: path.display().to_string(),
        source,
    })?;
    rsa::pkcs8::DecodePublicKey::from_public_key_pem(&pem)
        .or_else(|_| rsa::pkcs1::DecodeRsaPublicKey::from_pkcs1_pem(&pem))
        .map_err(|e: rsa::pkcs1::Error| CryptoError::ParseKey(e.to_string()))
}

/// Loads an RSA private key from a PEM file (PKCS#8 or PKCS#1).
pub fn load_private_key(path: &Path) -> Result<RsaPrivateKey, CryptoError> {
    let pem = std::fs::read_to_string(path).map_err(|source| CryptoError::ReadKey {
        path: path.display().to_string(),
        source,
    })?;
    rsa::pkcs8::DecodePrivateKey::from_pkcs8_pem(&pem)
        .or_else(|_| rsa::pkcs1::DecodeRsaPrivateKey::from_pkcs1_pem(&pem))
        .map_err(|e: rsa::pkcs1::Error| CryptoError::ParseKey(e.to_string()))
}

/// Encrypts `data`, splitting into length-prefixed blocks when it does not
/// fit a single PKCS#1 v1.5 block.
pub fn encrypt_chunked(data: &[u8], key: &RsaPublicKey) -> Result<Vec<u8>, CryptoError> {
    let chunk_size = key.size() - PKCS1_OVERHEAD;
    let mut rng = rand::thread_rng();

    if data.len() <= chunk_size {
        return Ok(key.encrypt(&mut rng, Pkcs1v15Encrypt, data)?);
    }

    let mut out = Vec::with_capacity(data.len() + data.len() / chunk_size * key.size());
    for chunk in data.chunks(chunk_size) {
        let block = key.encrypt(&mut rng, Pkcs1v15Encrypt, chunk)?;
        out.extend_from_slice(&(block.len() as u16).to_be_bytes());
        out.extend_from_slice(&block);
    }
    Ok(out)
}

/// Decrypts a payload produced by [`encrypt_chunked`].
pub fn decrypt_chunked(data: &[u8], key: &RsaPrivateKey) -> Result<Vec<u8>, CryptoError> {
    let key_size = key.size();

    if data.len() <= key_size {
        return Ok(key.decrypt(Pkcs1v15Encrypt, data)?);
    }

    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        if pos + 2 > data.len() {
            return Err(CryptoError::Malformed("truncated block length prefix"));
        }
        let block_len = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
        pos += 2;
        if pos + block_len > data.len() {
            return Err(CryptoError::Malformed("truncated ciphertext block"));
        }
        out.extend_from_slice(&key.decrypt(Pkcs1v15Encrypt, &data[pos..pos + block_len])?);
        pos += block_len;
    }
    Ok(out)
}
