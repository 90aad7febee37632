use sha2::{Digest, Sha256};

use crate::core::VarMap;

/// Checksum of a script: SHA-256 over the raw body plus the variable
/// context, hex-encoded.
///
/// The checksum is the drift/change signal, not just a file hash: it
/// must change when either the script body or any configured variable
/// changes. The context is folded in as sorted `name=value` lines after
/// a NUL separator so body bytes can never collide with context bytes.
/// Hashing the raw (pre-render) body keeps planning independent of the
/// renderer.
pub fn script_checksum(body: &str, vars: &VarMap) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hasher.update([0u8]);
    // VarMap is a BTreeMap, so iteration order is already sorted.
    for (name, value) in vars {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.to_string().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
