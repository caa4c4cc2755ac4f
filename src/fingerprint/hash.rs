// src/fingerprint/hash.rs

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use blake3::Hasher;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Compute the content fingerprint of a single file.
///
/// Streams the whole file through BLAKE3 and returns the lowercase hex
/// digest. Modification times are never consulted, so a copy or fresh
/// checkout of unchanged content keeps its fingerprint.
pub fn compute_file_hash(path: &Path) -> io::Result<String> {
    let mut hasher = Hasher::new();
    let mut file = File::open(path)?;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let hash = hasher.finalize().to_hex().to_string();
    trace!(path = ?path, hash = %hash, "hashed file");
    Ok(hash)
}

/// Fingerprint a file or a whole directory tree.
///
/// A directory hashes to an aggregate over every regular file below it,
/// visited in sorted order; each file contributes its relative path and its
/// content digest, so renames count as changes too.
pub fn compute_path_hash(path: &Path) -> io::Result<String> {
    if !path.is_dir() {
        return compute_file_hash(path);
    }

    let mut hasher = Hasher::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update(&[0]);
        hasher.update(compute_file_hash(entry.path())?.as_bytes());
    }
    let hash = hasher.finalize().to_hex().to_string();
    debug!(dir = ?path, hash = %hash, "computed directory hash");
    Ok(hash)
}
