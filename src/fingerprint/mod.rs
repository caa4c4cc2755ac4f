// src/fingerprint/mod.rs

//! Content fingerprints and their persistence.
//!
//! - [`hash`] computes BLAKE3 digests of files and directory trees.
//! - [`store`] remembers the digest of every file as of the last time it
//!   was successfully consumed, and answers "is this file dirty?".

pub mod hash;
pub mod store;

pub use hash::{compute_file_hash, compute_path_hash};
pub use store::{store_for_mode, FingerprintStore, MemoryStore, SidecarStore, SIDECAR_DIR};
