//! Checksum Engine: the closed set of supported digest algorithms.
//!
//! Name comparison is case-insensitive on input (`"sha256"`, `"SHA-256"`,
//! `"Sha-256"` all resolve to the same variant) but canonicalized on output
//! (`"SHA-256"`), matching the convention the store's config document and
//! returned `digest_map`s both rely on.

use digest::DynDigest;

use crate::error::{Error, Result};

/// One of the eight digest algorithms this store knows how to compute.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Algorithm {
    /// MD2 (128-bit, legacy, present for interoperability with old archives).
    Md2,
    /// MD5 (128-bit).
    Md5,
    /// SHA-1 (160-bit).
    Sha1,
    /// SHA-256 (256-bit). The usual store algorithm.
    Sha256,
    /// SHA-384 (384-bit).
    Sha384,
    /// SHA-512 (512-bit).
    Sha512,
    /// SHA-512/224 (224-bit truncation of SHA-512).
    Sha512_224,
    /// SHA-512/256 (256-bit truncation of SHA-512).
    Sha512_256,
}

impl Algorithm {
    /// The five algorithms [`DigestStream`](crate::digest_stream::DigestStream)
    /// computes for every stored object regardless of what the caller asks for.
    pub const DEFAULTS: [Algorithm; 5] =
        [Algorithm::Md5, Algorithm::Sha1, Algorithm::Sha256, Algorithm::Sha384, Algorithm::Sha512];

    /// The full supported set, in the order spec.md §4.A lists them.
    pub const ALL: [Algorithm; 8] = [
        Algorithm::Md2,
        Algorithm::Md5,
        Algorithm::Sha1,
        Algorithm::Sha256,
        Algorithm::Sha384,
        Algorithm::Sha512,
        Algorithm::Sha512_224,
        Algorithm::Sha512_256,
    ];

    /// Canonical, case-normalized display name (e.g. `"SHA-256"`).
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Algorithm::Md2 => "MD2",
            Algorithm::Md5 => "MD5",
            Algorithm::Sha1 => "SHA-1",
            Algorithm::Sha256 => "SHA-256",
            Algorithm::Sha384 => "SHA-384",
            Algorithm::Sha512 => "SHA-512",
            Algorithm::Sha512_224 => "SHA-512/224",
            Algorithm::Sha512_256 => "SHA-512/256",
        }
    }

    /// Hex-string length of a digest produced by this algorithm.
    pub fn hex_len(&self) -> usize {
        match self {
            Algorithm::Md2 | Algorithm::Md5 => 32,
            Algorithm::Sha1 => 40,
            Algorithm::Sha256 | Algorithm::Sha512_256 => 64,
            Algorithm::Sha512_224 => 56,
            Algorithm::Sha384 => 96,
            Algorithm::Sha512 => 128,
        }
    }

    /// Parse a name case-insensitively, ignoring `-`/`_`/`/` separators, so
    /// `"sha256"`, `"SHA-256"`, and `"Sha_256"` all resolve identically.
    pub fn parse(name: &str) -> Result<Algorithm> {
        let normalized: String =
            name.chars().filter(|c| c.is_ascii_alphanumeric()).map(|c| c.to_ascii_lowercase()).collect();
        let found = Algorithm::ALL.iter().find(|a| {
            let candidate: String = a
                .canonical_name()
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .map(|c| c.to_ascii_lowercase())
                .collect();
            candidate == normalized
        });
        found.copied().ok_or_else(|| Error::UnsupportedAlgorithm(name.to_string()))
    }

    /// Construct a boxed, dynamically-dispatched hasher for this algorithm.
    pub fn new_hasher(&self) -> Box<dyn DynDigest> {
        match self {
            Algorithm::Md2 => Box::new(md2::Md2::default()),
            Algorithm::Md5 => Box::new(md5::Md5::default()),
            Algorithm::Sha1 => Box::new(sha1::Sha1::default()),
            Algorithm::Sha256 => Box::new(sha2::Sha256::default()),
            Algorithm::Sha384 => Box::new(sha2::Sha384::default()),
            Algorithm::Sha512 => Box::new(sha2::Sha512::default()),
            Algorithm::Sha512_224 => Box::new(sha2::Sha512_224::default()),
            Algorithm::Sha512_256 => Box::new(sha2::Sha512_256::default()),
        }
    }

    /// One-shot digest of `bytes`, lowercase hex-encoded.
    pub fn digest_hex(&self, bytes: &[u8]) -> String {
        let mut hasher = self.new_hasher();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }
}

/// Case-insensitive, lowercase-normalized hex equality check. This is an
/// integrity check against accidental corruption, not a secret comparison,
/// so a timing-constant implementation is not required (spec.md §4.H).
pub fn hex_eq_ignore_case(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.eq_ignore_ascii_case(b)
}
