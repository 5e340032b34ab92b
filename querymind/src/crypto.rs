use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use rand_core::{OsRng, RngCore};

const NONCE_LEN: usize = 12;

#[derive(Debug)]
pub enum CryptoError {
    Encrypt(String),
    Decrypt(String),
    Decode(String),
    Json(serde_json::Error),
    InvalidKey(String),
}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CryptoError::Encrypt(e) => write!(f, "Encryption error: {e}"),
            CryptoError::Decrypt(e) => write!(f, "Decryption error: {e}"),
            CryptoError::Decode(e) => write!(f, "Base64 decode error: {e}"),
            CryptoError::Json(e) => write!(f, "JSON error: {e}"),
            CryptoError::InvalidKey(e) => write!(f, "Invalid encryption key: {e}"),
        }
    }
}

impl std::error::Error for CryptoError {}

/// Seals connection credentials at rest with AES-256-GCM.
///
/// Sealed form is base64(12-byte nonce ‖ ciphertext+tag). The empty string
/// opens to an empty JSON object so rows created without secrets stay readable.
#[derive(Clone)]
pub struct CredentialCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialCipher(****)")
    }
}

impl CredentialCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Build from a 64-char hex string.
    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        parse_hex_key(hex).map(Self::new)
    }

    /// Fresh random key; sealed values will not survive a restart.
    pub fn random() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    pub fn seal(&self, data: &serde_json::Value) -> Result<String, CryptoError> {
        let plaintext = serde_json::to_vec(data).map_err(CryptoError::Json)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let cipher = Aes256Gcm::new((&self.key).into());
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(&combined))
    }

    pub fn open(&self, sealed: &str) -> Result<serde_json::Value, CryptoError> {
        if sealed.is_empty() {
            return Ok(serde_json::json!({}));
        }

        let data = STANDARD
            .decode(sealed)
            .map_err(|e| CryptoError::Decode(e.to_string()))?;

        if data.len() < NONCE_LEN {
            return Err(CryptoError::Decrypt(
                "Ciphertext too short (< 12 bytes)".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let cipher = Aes256Gcm::new((&self.key).into());
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| CryptoError::Decrypt(e.to_string()))?;

        serde_json::from_slice(&plaintext).map_err(CryptoError::Json)
    }
}

/// Parse a 64-char hex string into a 32-byte key.
pub fn parse_hex_key(hex: &str) -> Result<[u8; 32], CryptoError> {
    let hex = hex.trim();
    if hex.len() != 64 {
        return Err(CryptoError::InvalidKey(format!(
            "expected 64 hex chars (32 bytes), got {}",
            hex.len()
        )));
    }
    let mut key = [0u8; 32];
    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let byte_str = std::str::from_utf8(chunk)
            .map_err(|_| CryptoError::InvalidKey("invalid UTF-8 in hex string".to_string()))?;
        key[i] = u8::from_str_radix(byte_str, 16).map_err(|_| {
            CryptoError::InvalidKey(format!("invalid hex character at byte {i}"))
        })?;
    }
    Ok(key)
}
