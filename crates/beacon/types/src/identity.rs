//! Device identity types.
//!
//! A [`DeviceIdentity`] binds a data stream to a device. Until the host app
//! supplies a durable identity, the SDK may run in temporary mode, where the
//! identity value is the reserved [`TEMPORARY_DEVICE_ID`] marker.

use serde::{Deserialize, Serialize};

/// Reserved identity value denoting "no durable identity assigned yet".
///
/// Requests enqueued while in temporary mode carry this marker and are
/// rewritten in place when a durable identity is committed.
pub const TEMPORARY_DEVICE_ID: &str = "BeaconTemporaryDeviceID";

/// How an identity value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityKind {
    /// Temporary mode; the value is always [`TEMPORARY_DEVICE_ID`].
    Temporary,
    /// Supplied by the host application developer.
    DeveloperSupplied,
    /// Generated by the SDK itself.
    SdkGenerated,
    /// Provided by the platform (e.g. an advertising identifier).
    PlatformProvided,
}

impl std::fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityKind::Temporary => write!(f, "temporary"),
            IdentityKind::DeveloperSupplied => write!(f, "developer-supplied"),
            IdentityKind::SdkGenerated => write!(f, "sdk-generated"),
            IdentityKind::PlatformProvided => write!(f, "platform-provided"),
        }
    }
}

/// The device identity current for a data stream.
///
/// Invariant: `kind == Temporary` if and only if `value == TEMPORARY_DEVICE_ID`.
/// The constructors uphold this; there is no way to build a temporary identity
/// with a non-marker value or vice versa.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    value: String,
    kind: IdentityKind,
}

impl DeviceIdentity {
    /// Create a durable (non-temporary) identity.
    ///
    /// A `Temporary` kind or the marker value is rerouted to [`Self::temporary`]
    /// so the marker invariant cannot be violated.
    pub fn new(kind: IdentityKind, value: impl Into<String>) -> Self {
        let value = value.into();
        if kind == IdentityKind::Temporary || value == TEMPORARY_DEVICE_ID {
            return Self::temporary();
        }
        Self { value, kind }
    }

    /// The temporary-mode identity.
    pub fn temporary() -> Self {
        Self {
            value: TEMPORARY_DEVICE_ID.to_string(),
            kind: IdentityKind::Temporary,
        }
    }

    /// The identity token. Opaque to this subsystem.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// How the identity value was obtained.
    pub fn kind(&self) -> IdentityKind {
        self.kind
    }

    /// True iff this is the temporary-mode identity.
    pub fn is_temporary(&self) -> bool {
        self.kind == IdentityKind::Temporary
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.value, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_identity_carries_marker() {
        let id = DeviceIdentity::temporary();
        assert_eq!(id.value(), TEMPORARY_DEVICE_ID);
        assert_eq!(id.kind(), IdentityKind::Temporary);
        assert!(id.is_temporary());
    }

    #[test]
    fn durable_identity_is_not_temporary() {
        let id = DeviceIdentity::new(IdentityKind::DeveloperSupplied, "abc123");
        assert_eq!(id.value(), "abc123");
        assert!(!id.is_temporary());
    }

    #[test]
    fn marker_value_forces_temporary_kind() {
        let id = DeviceIdentity::new(IdentityKind::DeveloperSupplied, TEMPORARY_DEVICE_ID);
        assert!(id.is_temporary());
        assert_eq!(id.kind(), IdentityKind::Temporary);
    }

    #[test]
    fn temporary_kind_forces_marker_value() {
        let id = DeviceIdentity::new(IdentityKind::Temporary, "whatever");
        assert_eq!(id.value(), TEMPORARY_DEVICE_ID);
    }
}
