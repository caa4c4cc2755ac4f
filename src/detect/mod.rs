// src/detect/mod.rs

//! Change detection: from tracked directories and recorded fingerprints to
//! the set of work items a stage has to process.
//!
//! It knows nothing about how items are processed; it only reads files and
//! the fingerprint store.

pub mod change_set;
pub mod detector;
pub mod naming;

pub use change_set::{ChangeSet, TrackedFile};
pub use detector::{ChangeSetDetector, TrackedLocation};
pub use naming::IdConvention;
