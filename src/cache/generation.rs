//! Cache generation naming
//!
//! A generation is one named cache inside the store. Names follow
//! `{prefix}-{kind}-{version}`, e.g. `leoiptv-static-v1`. Bumping the version
//! on deploy produces new names, and activation deletes everything else.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which tier a generation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    /// Precached application shell, rebuilt on every deploy
    Static,
    /// Runtime-populated cache of fetched resources
    Dynamic,
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// A named, versioned cache generation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Generation {
    pub prefix: String,
    pub kind: GenerationKind,
    pub version: String,
}

impl Generation {
    pub fn new(prefix: impl Into<String>, kind: GenerationKind, version: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            kind,
            version: version.into(),
        }
    }

    /// Store-level name of this generation
    pub fn name(&self) -> String {
        format!("{}-{}-{}", self.prefix, self.kind, self.version)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The current static and dynamic generations of one deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSet {
    pub static_gen: Generation,
    pub dynamic_gen: Generation,
}

impl GenerationSet {
    /// Both generations for a prefix and version
    pub fn new(prefix: &str, version: &str) -> Self {
        Self {
            static_gen: Generation::new(prefix, GenerationKind::Static, version),
            dynamic_gen: Generation::new(prefix, GenerationKind::Dynamic, version),
        }
    }

    pub fn static_name(&self) -> String {
        self.static_gen.name()
    }

    pub fn dynamic_name(&self) -> String {
        self.dynamic_gen.name()
    }

    /// Whether a store name belongs to this deployment
    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_name() || name == self.dynamic_name()
    }
}
