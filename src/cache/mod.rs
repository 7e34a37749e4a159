//! Cache generations, the precache manifest and usage reporting
//!
//! # Generations
//!
//! | Kind | Example name | Populated by | Deleted when |
//! |------|--------------|--------------|--------------|
//! | Static | `leoiptv-static-v1` | install (bulk, atomic) | version changes |
//! | Dynamic | `leoiptv-dynamic-v1` | interceptor, background refresh | version changes |
//!
//! Entries are never expired individually. A deploy bumps the version, the
//! new worker installs a fresh static generation, and activation removes
//! every name that is not current.

pub mod generation;
pub mod manifest;
pub mod usage;

pub use generation::{Generation, GenerationKind, GenerationSet};
pub use manifest::PrecacheManifest;
pub use usage::{format_bytes, GenerationUsage, StorageEstimate, UsageStatus};
