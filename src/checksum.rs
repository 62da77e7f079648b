//! Content checksum computation and object-key embedding
//!
//! Every object the engine uploads gets a content fingerprint: MD5 on the
//! fast path, SHA-512 when the digest is embedded (base32, padding stripped)
//! into the object key itself. Verification recomputes the digest from the
//! downloaded bytes and compares exactly; there is no partial match and no
//! automatic retry on mismatch.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use data_encoding::BASE32;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::error::EngineError;

/// Files are streamed through the hasher in chunks of this size, so digest
/// computation never needs the whole file in memory.
const READ_CHUNK_SIZE: usize = 8192;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Md5,
    Sha512,
}

impl Default for ChecksumAlgorithm {
    fn default() -> Self {
        ChecksumAlgorithm::Md5
    }
}

/// Compute the digest of the file at `path` by streaming it through the
/// selected hasher.
pub fn compute_digest(path: &Path, algorithm: ChecksumAlgorithm) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; READ_CHUNK_SIZE];

    match algorithm {
        ChecksumAlgorithm::Md5 => {
            let mut context = md5::Context::new();
            loop {
                let read = file.read(&mut buffer)?;
                if read == 0 {
                    break;
                }
                context.consume(&buffer[..read]);
            }
            Ok(context.compute().0.to_vec())
        }
        ChecksumAlgorithm::Sha512 => {
            let mut hasher = Sha512::new();
            loop {
                let read = file.read(&mut buffer)?;
                if read == 0 {
                    break;
                }
                hasher.update(&buffer[..read]);
            }
            Ok(hasher.finalize().to_vec())
        }
    }
}

/// Compute the digest of the file at `path` and render it as lowercase hex.
pub fn compute_digest_hex(path: &Path, algorithm: ChecksumAlgorithm) -> io::Result<String> {
    Ok(hex::encode(compute_digest(path, algorithm)?))
}

/// Pick the algorithm that produced a recorded hex digest. SHA-512 renders
/// as 128 hex characters; everything else in our journals is MD5.
pub fn algorithm_for_digest(hex_digest: &str) -> ChecksumAlgorithm {
    if hex_digest.len() == 128 {
        ChecksumAlgorithm::Sha512
    } else {
        ChecksumAlgorithm::Md5
    }
}

/// Build an object key of the form `<prefix>_<BASE32TOKEN>_<sequence>`,
/// where the token is the base32 digest with trailing `=` padding stripped.
pub fn embedded_checksum_key(prefix: &str, digest: &[u8], sequence: usize) -> String {
    let encoded = BASE32.encode(digest);
    let token = encoded.trim_end_matches('=');
    format!("{}_{}_{}", prefix, token, sequence)
}

/// Decode the base32 checksum token embedded in an object key back to raw
/// digest bytes.
///
/// The token is the second `_`-separated field from the right (the prefix
/// itself may contain underscores). Stripped tokens are re-padded with `=`
/// until their length is a multiple of 8 before decoding; a token whose
/// stripped length is 7 mod 8 gets exactly one `=`.
pub fn decode_embedded_checksum(object_key: &str) -> Result<Vec<u8>, EngineError> {
    let mut fields = object_key.rsplitn(3, '_');
    let _sequence = fields
        .next()
        .ok_or_else(|| EngineError::BadChecksumToken(object_key.to_string()))?;
    let token = fields
        .next()
        .ok_or_else(|| EngineError::BadChecksumToken(object_key.to_string()))?;

    let padded = pad_base32_token(token);
    BASE32
        .decode(padded.as_bytes())
        .map_err(|_| EngineError::BadChecksumToken(object_key.to_string()))
}

/// Restore the `=` padding stripped when the token was embedded in a key.
fn pad_base32_token(token: &str) -> String {
    let mut padded = token.to_string();
    while padded.len() % 8 != 0 {
        padded.push('=');
    }
    padded
}
