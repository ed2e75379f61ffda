//! Content digests used to verify downloads
//!
//! Catalogs publish different hash functions (Modrinth SHA-512, Hangar
//! SHA-256), so the algorithm is always passed in rather than assumed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::error::Result;

/// Hash function a catalog publishes for its files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    /// Key used in catalog hash maps
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    /// Guess the algorithm from a hex digest's length
    pub fn from_hex_len(hex_digest: &str) -> Option<Self> {
        match hex_digest.trim().len() {
            64 => Some(DigestAlgorithm::Sha256),
            128 => Some(DigestAlgorithm::Sha512),
            _ => None,
        }
    }

    pub fn hasher(&self) -> StreamingDigest {
        match self {
            DigestAlgorithm::Sha256 => StreamingDigest::Sha256(Sha256::new()),
            DigestAlgorithm::Sha512 => StreamingDigest::Sha512(Sha512::new()),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Incremental hasher fed chunk by chunk while bytes stream to disk
pub enum StreamingDigest {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl StreamingDigest {
    pub fn update(&mut self, chunk: &[u8]) {
        match self {
            StreamingDigest::Sha256(h) => h.update(chunk),
            StreamingDigest::Sha512(h) => h.update(chunk),
        }
    }

    /// Lowercase hex of the final digest
    pub fn finalize_hex(self) -> String {
        match self {
            StreamingDigest::Sha256(h) => hex::encode(h.finalize()),
            StreamingDigest::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Case-insensitive digest comparison
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

/// Hash a file already on disk
pub async fn digest_file(path: &Path, algorithm: DigestAlgorithm) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = algorithm.hasher();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize_hex())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // sha256("abc")
    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn test_streaming_matches_one_shot() {
        let mut hasher = DigestAlgorithm::Sha256.hasher();
        hasher.update(b"a");
        hasher.update(b"bc");
        assert_eq!(hasher.finalize_hex(), ABC_SHA256);

        let mut hasher = DigestAlgorithm::Sha512.hasher();
        hasher.update(b"abc");
        assert_eq!(hasher.finalize_hex(), hex::encode(Sha512::digest(b"abc")));
    }

    #[test]
    fn test_digests_match_ignores_case() {
        assert!(digests_match(&ABC_SHA256.to_uppercase(), ABC_SHA256));
        assert!(!digests_match("deadbeef", ABC_SHA256));
    }

    #[test]
    fn test_from_hex_len() {
        assert_eq!(
            DigestAlgorithm::from_hex_len(ABC_SHA256),
            Some(DigestAlgorithm::Sha256)
        );
        assert_eq!(
            DigestAlgorithm::from_hex_len(&"a".repeat(128)),
            Some(DigestAlgorithm::Sha512)
        );
        assert_eq!(DigestAlgorithm::from_hex_len("abc"), None);
    }

    #[tokio::test]
    async fn test_digest_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("abc.txt");
        std::fs::write(&path, b"abc").unwrap();

        let digest = digest_file(&path, DigestAlgorithm::Sha256).await.unwrap();
        assert_eq!(digest, ABC_SHA256);
    }
}
