//! Startup configuration for identity resolution.

use serde::{Deserialize, Serialize};

use crate::identity::IdentityKind;

/// Configuration the host application passes at SDK initialization.
///
/// Resolution rules live in `beacon-identity`; this struct only carries what
/// the host decided: whether temporary mode is the default, and optionally an
/// explicit identity value and/or kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Start in temporary mode when no explicit value is given.
    pub temporary_mode_enabled: bool,

    /// Explicit identity value supplied by the host, if any.
    pub explicit_value: Option<String>,

    /// Explicit identity kind supplied by the host, if any.
    pub explicit_kind: Option<IdentityKind>,
}

impl IdentityConfig {
    /// Temporary mode with no explicit identity.
    pub fn temporary() -> Self {
        Self {
            temporary_mode_enabled: true,
            ..Self::default()
        }
    }

    /// Explicit developer-supplied identity value.
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            explicit_value: Some(value.into()),
            ..Self::default()
        }
    }
}
