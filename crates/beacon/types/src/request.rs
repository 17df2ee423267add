//! Pending outbound requests and the delivery queue.
//!
//! A [`PendingRequest`] is an ordered sequence of key/value components. The
//! subsystem treats the payload as opaque except for one component: the
//! identity tag under [`DEVICE_ID_KEY`], which binds the request to the
//! device identity current at enqueue time. The tag is read and replaced
//! structurally; serialization to wire form happens only at the transport
//! boundary via [`PendingRequest::to_form_encoded`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::TEMPORARY_DEVICE_ID;

/// Component key that carries the identity tag.
pub const DEVICE_ID_KEY: &str = "device_id";

/// One `key=value` component of a request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestComponent {
    pub key: String,
    pub value: String,
}

impl RequestComponent {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A queued outbound request awaiting delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    components: Vec<RequestComponent>,

    /// When the request was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl PendingRequest {
    /// Build a request from ordered components.
    pub fn new(components: Vec<RequestComponent>) -> Self {
        Self {
            components,
            enqueued_at: Utc::now(),
        }
    }

    /// The ordered components.
    pub fn components(&self) -> &[RequestComponent] {
        &self.components
    }

    /// Value of the first component with the given key, if any.
    pub fn component(&self, key: &str) -> Option<&str> {
        self.components
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.value.as_str())
    }

    /// The identity tag, if the request carries one.
    pub fn identity_tag(&self) -> Option<&str> {
        self.component(DEVICE_ID_KEY)
    }

    /// True iff the identity tag is exactly the temporary marker.
    ///
    /// Exact component-value comparison; a marker substring inside another
    /// component's value never matches.
    pub fn has_temporary_tag(&self) -> bool {
        self.identity_tag() == Some(TEMPORARY_DEVICE_ID)
    }

    /// Replace the identity tag in place, preserving component order and all
    /// other components. Returns true if a tag component was present.
    pub fn set_identity_tag(&mut self, value: &str) -> bool {
        match self.components.iter_mut().find(|c| c.key == DEVICE_ID_KEY) {
            Some(c) => {
                c.value = value.to_string();
                true
            }
            None => false,
        }
    }

    /// Serialize to `key=value&key=value` form for the transport boundary.
    pub fn to_form_encoded(&self) -> String {
        self.components
            .iter()
            .map(|c| format!("{}={}", c.key, c.value))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Ordered FIFO sequence of pending requests.
///
/// Order and element count are hard invariants: the exit-temporary rewrite
/// must return a queue of identical length and ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestQueue(Vec<PendingRequest>);

impl RequestQueue {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_requests(requests: Vec<PendingRequest>) -> Self {
        Self(requests)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, request: PendingRequest) {
        self.0.push(request);
    }

    pub fn requests(&self) -> &[PendingRequest] {
        &self.0
    }

    pub fn into_requests(self) -> Vec<PendingRequest> {
        self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PendingRequest> {
        self.0.iter()
    }
}

impl IntoIterator for RequestQueue {
    type Item = PendingRequest;
    type IntoIter = std::vec::IntoIter<PendingRequest>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_tag(tag: &str) -> PendingRequest {
        PendingRequest::new(vec![
            RequestComponent::new("app_key", "k-1"),
            RequestComponent::new(DEVICE_ID_KEY, tag),
            RequestComponent::new("events", "[{\"key\":\"tap\"}]"),
        ])
    }

    #[test]
    fn identity_tag_reads_the_device_id_component() {
        let req = request_with_tag("abc123");
        assert_eq!(req.identity_tag(), Some("abc123"));
        assert!(!req.has_temporary_tag());
    }

    #[test]
    fn temporary_tag_requires_exact_match() {
        let req = request_with_tag(TEMPORARY_DEVICE_ID);
        assert!(req.has_temporary_tag());

        // Marker embedded in another component's value must not match.
        let decoy = PendingRequest::new(vec![
            RequestComponent::new("note", format!("was {TEMPORARY_DEVICE_ID} once")),
            RequestComponent::new(DEVICE_ID_KEY, "durable-1"),
        ]);
        assert!(!decoy.has_temporary_tag());
    }

    #[test]
    fn set_identity_tag_preserves_order_and_other_components() {
        let mut req = request_with_tag(TEMPORARY_DEVICE_ID);
        let before: Vec<String> = req.components().iter().map(|c| c.key.clone()).collect();

        assert!(req.set_identity_tag("user42"));

        let after: Vec<String> = req.components().iter().map(|c| c.key.clone()).collect();
        assert_eq!(before, after);
        assert_eq!(req.identity_tag(), Some("user42"));
        assert_eq!(req.component("app_key"), Some("k-1"));
        assert_eq!(req.component("events"), Some("[{\"key\":\"tap\"}]"));
    }

    #[test]
    fn set_identity_tag_reports_missing_component() {
        let mut req = PendingRequest::new(vec![RequestComponent::new("app_key", "k-1")]);
        assert!(!req.set_identity_tag("user42"));
        assert_eq!(req.identity_tag(), None);
    }

    #[test]
    fn form_encoding_keeps_component_order() {
        let req = request_with_tag("abc123");
        assert_eq!(
            req.to_form_encoded(),
            "app_key=k-1&device_id=abc123&events=[{\"key\":\"tap\"}]"
        );
    }

    #[test]
    fn queue_is_fifo() {
        let mut queue = RequestQueue::new();
        queue.push(request_with_tag("first"));
        queue.push(request_with_tag("second"));

        let tags: Vec<_> = queue
            .iter()
            .map(|r| r.identity_tag().unwrap().to_string())
            .collect();
        assert_eq!(tags, vec!["first", "second"]);
    }
}
