//! # Beacon Types - Core data model for the Beacon analytics client
//!
//! This crate holds the pure data types shared across the Beacon SDK:
//!
//! - [`DeviceIdentity`]: the identity token attached to a user's data stream
//! - [`PendingRequest`]: a queued outbound request awaiting delivery
//! - [`RequestQueue`]: the ordered pending-request sequence
//! - [`IdentityConfig`]: startup configuration for identity resolution
//!
//! No I/O and no async code lives here. Storage backends and the transition
//! logic are in `beacon-identity`.

pub mod config;
pub mod identity;
pub mod request;

pub use config::IdentityConfig;
pub use identity::{DeviceIdentity, IdentityKind, TEMPORARY_DEVICE_ID};
pub use request::{PendingRequest, RequestComponent, RequestQueue, DEVICE_ID_KEY};
