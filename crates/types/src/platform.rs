//! Platform context handed to adapters.

use serde::{Deserialize, Serialize};

/// The slice of platform configuration adapters are allowed to see when
/// resolving container specs or running lifecycle hooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformContext {
    /// Base DNS domain under which pod subdomains are published.
    pub domain: String,
    /// The pod's data directory (per-pod, not the platform root).
    pub data_dir: String,
}

impl PlatformContext {
    pub fn new(domain: impl Into<String>, data_dir: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            data_dir: data_dir.into(),
        }
    }
}
