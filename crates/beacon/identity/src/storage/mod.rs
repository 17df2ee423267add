//! Persistence backends for the identity record and the request queue.
//!
//! Storage is abstracted behind async traits so host platforms can plug in
//! their own persistence; the in-memory backends are the reference
//! implementation and the test substrate.

pub mod memory;
pub mod traits;

pub use memory::{InMemoryIdentityStore, InMemoryRequestQueueStore};
pub use traits::{IdentityStore, RequestQueueStore};
