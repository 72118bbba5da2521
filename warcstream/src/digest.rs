// Copyright 2025 Janek Bevendorff
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! `WARC-Block-Digest` computation and verification.
//!
//! Digest values have the form `algorithm:value`. Writers emit base32 as
//! recommended for WARC, readers also accept hex and base64 values, which
//! are common in the wild.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::{Digest, Sha1};
use sha2::Sha256;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha1" => Some(DigestAlgorithm::Sha1),
            "sha256" => Some(DigestAlgorithm::Sha256),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha256 => "sha256",
        }
    }

    pub fn compute(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        }
    }
}

/// Digest header value (`sha1:<base32>`) for a content block.
pub fn block_digest(algorithm: DigestAlgorithm, data: &[u8]) -> String {
    format!("{}:{}", algorithm.label(), base32_encode(&algorithm.compute(data)))
}

/// Outcome of checking a digest header value against content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestVerdict {
    Match,
    Mismatch { algorithm: String, expected: String, actual: String },
    Unsupported { algorithm: String, expected: String },
}

/// Check a digest header value against a content block.
pub fn verify_digest(value: &str, data: &[u8]) -> DigestVerdict {
    let (label, expected) = value.trim().split_once(':').unwrap_or(("", value.trim()));
    let algorithm = match DigestAlgorithm::from_label(label) {
        Some(a) => a,
        None => return DigestVerdict::Unsupported {
            algorithm: label.to_string(),
            expected: expected.to_string(),
        },
    };

    let computed = algorithm.compute(data);
    let matches = [
        base32_decode(expected),
        hex::decode(expected).ok(),
        BASE64.decode(expected).ok(),
    ].into_iter().flatten().any(|decoded| decoded == computed);

    if matches {
        DigestVerdict::Match
    } else {
        DigestVerdict::Mismatch {
            algorithm: algorithm.label().to_string(),
            expected: expected.to_string(),
            actual: base32_encode(&computed),
        }
    }
}

/// RFC 4648 base32 without padding.
pub fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(5) * 8);
    let mut buffer = 0u32;
    let mut bits = 0;
    for &byte in data {
        buffer = (buffer << 8) | byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

/// Decode RFC 4648 base32, case-insensitive, with or without padding.
pub fn base32_decode(value: &str) -> Option<Vec<u8>> {
    let value = value.trim_end_matches('=');
    let mut out = Vec::with_capacity(value.len() * 5 / 8);
    let mut buffer = 0u32;
    let mut bits = 0;
    for c in value.bytes() {
        let c = c.to_ascii_uppercase();
        let v = BASE32_ALPHABET.iter().position(|&a| a == c)? as u32;
        buffer = (buffer << 5) | v;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
    }
    Some(out)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base32() {
        assert_eq!(base32_encode(b""), "");
        assert_eq!(base32_encode(b"f"), "MY");
        assert_eq!(base32_encode(b"foobar"), "MZXW6YTBOI");
        assert_eq!(base32_decode("MZXW6YTBOI======").unwrap(), b"foobar");
        assert_eq!(base32_decode("mzxw6ytboi").unwrap(), b"foobar");
        assert!(base32_decode("MZ1").is_none());
    }

    #[test]
    fn test_block_digest() {
        // SHA-1 of the empty string
        assert_eq!(block_digest(DigestAlgorithm::Sha1, b""), "sha1:3I42H3S6NNFQ2MSVX7XZKYAYSCX5QBYJ");
        assert_eq!(verify_digest("sha1:3I42H3S6NNFQ2MSVX7XZKYAYSCX5QBYJ", b""), DigestVerdict::Match);
        assert_eq!(verify_digest("SHA-1:da39a3ee5e6b4b0d3255bfef95601890afd80709", b""), DigestVerdict::Match);
        assert_eq!(verify_digest("sha1:2jmj7l5rSw0yVb/vlWAYkK/YBwk=", b""), DigestVerdict::Match);
    }

    #[test]
    fn test_sha256() {
        let digest = block_digest(DigestAlgorithm::Sha256, b"abc");
        assert!(digest.starts_with("sha256:"));
        assert_eq!(verify_digest(&digest, b"abc"), DigestVerdict::Match);
        assert!(matches!(verify_digest(&digest, b"abd"), DigestVerdict::Mismatch { .. }));
    }

    #[test]
    fn test_unsupported() {
        assert_eq!(verify_digest("md5:abc", b""), DigestVerdict::Unsupported {
            algorithm: "md5".to_string(),
            expected: "abc".to_string(),
        });
    }
}
