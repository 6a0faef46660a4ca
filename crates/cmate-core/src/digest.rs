//! # SHA-256 Digests
//!
//! Every hash in the audit store is SHA-256, rendered as 64 lowercase hex
//! characters. Structured content is hashed only through
//! [`CanonicalBytes`]; raw byte hashing is reserved for domain-separated
//! tree nodes ([`tagged_digest`]), whose inputs are themselves digests.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalBytes;
use crate::error::CryptoError;

/// A 32-byte SHA-256 digest. Serializes as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse 64 hex characters. Upper case is accepted and normalized.
    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        let malformed = |reason: String| CryptoError::MalformedDigest {
            value: hex.to_string(),
            reason,
        };
        if hex.len() != 64 || !hex.is_ascii() {
            return Err(malformed(format!("expected 64 hex characters, got {}", hex.len())));
        }
        let mut bytes = [0u8; 32];
        for (i, pair) in hex.as_bytes().chunks_exact(2).enumerate() {
            let hi = nibble(pair[0]).ok_or_else(|| malformed(format!("bad hex at {}", 2 * i)))?;
            let lo = nibble(pair[1]).ok_or_else(|| malformed(format!("bad hex at {}", 2 * i + 1)))?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

fn nibble(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::str::FromStr for ContentDigest {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = CryptoError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<ContentDigest> for String {
    fn from(d: ContentDigest) -> Self {
        d.to_hex()
    }
}

/// Digest of canonical content.
pub fn sha256_digest(data: &CanonicalBytes) -> ContentDigest {
    finish(Sha256::new_with_prefix(data.as_bytes()))
}

/// Hex digest of canonical content.
pub fn sha256_hex(data: &CanonicalBytes) -> String {
    sha256_digest(data).to_hex()
}

/// `SHA256(tag || parts[0] || parts[1] ..)` over existing digests.
pub fn tagged_digest(tag: u8, parts: &[&ContentDigest]) -> ContentDigest {
    let mut hasher = Sha256::new();
    hasher.update([tag]);
    for part in parts {
        hasher.update(part.as_bytes());
    }
    finish(hasher)
}

fn finish(hasher: Sha256) -> ContentDigest {
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    ContentDigest(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_vector() {
        let cb = CanonicalBytes::new(&serde_json::json!({})).unwrap();
        assert_eq!(
            sha256_hex(&cb),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn test_uppercase_hex_normalized() {
        let lower = "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a";
        let d: ContentDigest = lower.to_uppercase().parse().unwrap();
        assert_eq!(d.to_hex(), lower);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(ContentDigest::from_hex("abcd").is_err());
        assert!(ContentDigest::from_hex(&"zz".repeat(32)).is_err());
        assert!(ContentDigest::from_hex(&"é".repeat(32)).is_err());
    }

    #[test]
    fn test_serde_as_hex_string() {
        let d = sha256_digest(&CanonicalBytes::new(&serde_json::json!({"k": 1})).unwrap());
        let v = serde_json::to_value(d).unwrap();
        assert_eq!(v, serde_json::Value::String(d.to_hex()));
        assert_eq!(serde_json::from_value::<ContentDigest>(v).unwrap(), d);
    }

    #[test]
    fn test_tag_separates_domains() {
        let d = sha256_digest(&CanonicalBytes::new(&serde_json::json!({})).unwrap());
        assert_ne!(tagged_digest(0x00, &[&d]), tagged_digest(0x01, &[&d]));
        assert_ne!(tagged_digest(0x01, &[&d, &d]), tagged_digest(0x01, &[&d]));
    }
}
