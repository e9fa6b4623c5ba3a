//! MD5 digest helpers.
//!
//! The file host identifies uploads by MD5, so the algorithm is fixed by
//! the wire protocol rather than chosen for strength. Digests are returned
//! as lowercase hex strings.

use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

/// Computes MD5 of `data` and returns the hex-encoded digest.
pub fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes MD5 of an entire file and returns the hex-encoded digest.
pub fn md5_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Computes MD5 of `value` with `salt` prepended.
pub fn salted_md5_hex(salt: &str, value: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(salt.as_bytes());
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}
