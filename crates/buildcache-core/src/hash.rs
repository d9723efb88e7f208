//! Content-addressable digest abstraction (spec.md §4.1).
//!
//! [`Fingerprint`] is an opaque, algorithm-tagged byte string. Two
//! fingerprints never compare equal unless both their algorithm tag and
//! their bytes match, so a restore can never silently accept a record
//! produced under a different algorithm.

use std::fmt;

use derive_more::{Display, Error};
use sha2::Digest as _;

/// The closed set of supported digest algorithms.
///
/// Adding a new variant here is the only way to add an algorithm; the
/// string identifier is what gets persisted alongside every [`Fingerprint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Blake3,
    Sha256,
}

impl Algorithm {
    pub fn identifier(self) -> &'static str {
        match self {
            Algorithm::Blake3 => "blake3",
            Algorithm::Sha256 => "sha256",
        }
    }

    pub fn parse(identifier: &str) -> Result<Self, UnknownAlgorithm> {
        match identifier {
            "blake3" => Ok(Algorithm::Blake3),
            "sha256" => Ok(Algorithm::Sha256),
            other => Err(UnknownAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

#[derive(Debug, Display, Error)]
#[display("unknown hash algorithm: {_0}")]
pub struct UnknownAlgorithm(#[error(not(source))] pub String);

/// An algorithm-tagged, fixed-width digest.
///
/// Equality is byte-wise over the tagged representation: a [`Fingerprint`]
/// computed under one algorithm never compares equal to one computed under
/// another, even if the raw bytes happened to collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    algorithm: Algorithm,
    bytes: Vec<u8>,
}

impl Fingerprint {
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hex-encode the digest bytes for persistence and lookup keys. The
    /// algorithm tag is carried out of band (it is a sibling field on every
    /// persisted record), not folded into the hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn from_hex(algorithm: Algorithm, hex_str: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self {
            algorithm,
            bytes: hex::decode(hex_str)?,
        })
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

/// A stateful digest accumulator.
///
/// `update` may be called any number of times before `finish`; the result is
/// identical to hashing the concatenation of all updates in order.
pub enum Hasher {
    Blake3(blake3::Hasher),
    Sha256(sha2::Sha256),
}

impl Hasher {
    pub fn update(&mut self, bytes: &[u8]) -> &mut Self {
        match self {
            Hasher::Blake3(h) => {
                h.update(bytes);
            }
            Hasher::Sha256(h) => {
                h.update(bytes);
            }
        }
        self
    }

    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.update(s.as_bytes())
    }

    pub fn finish(self) -> Fingerprint {
        match self {
            Hasher::Blake3(h) => Fingerprint {
                algorithm: Algorithm::Blake3,
                bytes: h.finalize().as_bytes().to_vec(),
            },
            Hasher::Sha256(h) => Fingerprint {
                algorithm: Algorithm::Sha256,
                bytes: h.finalize().to_vec(),
            },
        }
    }
}

/// Produces [`Fingerprint`]s for byte streams, strings, and ordered
/// aggregates of other fingerprints, all under a single configured
/// algorithm.
#[derive(Debug, Clone, Copy)]
pub struct HashEngine {
    algorithm: Algorithm,
}

impl HashEngine {
    pub fn new(algorithm: Algorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn new_hasher(&self) -> Hasher {
        match self.algorithm {
            Algorithm::Blake3 => Hasher::Blake3(blake3::Hasher::new()),
            Algorithm::Sha256 => Hasher::Sha256(sha2::Sha256::new()),
        }
    }

    pub fn hash(&self, bytes: &[u8]) -> Fingerprint {
        let mut hasher = self.new_hasher();
        hasher.update(bytes);
        hasher.finish()
    }

    pub fn hash_str(&self, s: &str) -> Fingerprint {
        self.hash(s.as_bytes())
    }

    /// Combine ordered fingerprints into one, by hashing the concatenation
    /// of their length-prefixed bytes. Ordering is the caller's
    /// responsibility: this function never sorts its input.
    pub fn combine<'a>(&self, fingerprints: impl IntoIterator<Item = &'a Fingerprint>) -> Fingerprint {
        let mut hasher = self.new_hasher();
        for fp in fingerprints {
            let len = fp.as_bytes().len() as u64;
            hasher.update(&len.to_le_bytes());
            hasher.update(fp.as_bytes());
        }
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn hash_is_deterministic() {
        let engine = HashEngine::new(Algorithm::Blake3);
        let a = engine.hash(b"hello world");
        let b = engine.hash(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn different_algorithms_never_compare_equal() {
        let blake3 = HashEngine::new(Algorithm::Blake3).hash(b"same bytes");
        let sha256 = HashEngine::new(Algorithm::Sha256).hash(b"same bytes");
        assert_ne!(blake3, sha256);
    }

    #[test]
    fn combine_is_order_sensitive() {
        let engine = HashEngine::new(Algorithm::Blake3);
        let a = engine.hash(b"a");
        let b = engine.hash(b"b");

        let ab = engine.combine([&a, &b]);
        let ba = engine.combine([&b, &a]);
        assert_ne!(ab, ba);
    }

    #[test]
    fn combine_is_length_prefixed_not_just_concatenated() {
        // Without length prefixing, combine([hash("a"), hash("bc")]) could
        // collide with combine([hash("ab"), hash("c")]) if the underlying
        // bytes concatenated identically. We can't easily force a real
        // collision, but we can verify the hasher consumes a length prefix
        // by checking combine(["x"]) != hash(x's raw bytes without prefix).
        let engine = HashEngine::new(Algorithm::Blake3);
        let x = engine.hash(b"x");
        let combined = engine.combine([&x]);
        let direct = engine.hash(x.as_bytes());
        assert_ne!(combined, direct);
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        assert!(Algorithm::parse("md5").is_err());
        assert!(Algorithm::parse("sha256").is_ok());
    }
}
