//! Presentation hooks invoked by [`ApiClient`](crate::ApiClient) around each
//! request.

use crate::classify::ErrorRecord;
use crate::client::{RequestDescriptor, ResponseEnvelope};

/// Request lifecycle callbacks. Every method defaults to a no-op.
pub trait RequestObserver: Send + Sync {
    /// Called when a request that did not suppress the indicator starts.
    fn show_loading(&self, _request: &RequestDescriptor) {}

    /// Called exactly once for every `show_loading`, on success or failure.
    fn hide_loading(&self, _request: &RequestDescriptor) {}

    fn on_start(&self, _request: &RequestDescriptor) {}

    fn on_success(&self, _response: &ResponseEnvelope) {}

    fn on_failure(&self, _request: &RequestDescriptor, _record: &ErrorRecord) {}
}

/// Transient user-visible notifications.
pub trait Notifier: Send + Sync {
    fn notify_error(&self, message: &str);
}

/// Observer and notifier that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl RequestObserver for NoopObserver {}

impl Notifier for NoopObserver {
    fn notify_error(&self, _message: &str) {}
}

/// Notifier that writes notifications to the `tracing` subscriber.
#[cfg(feature = "tracing")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

#[cfg(feature = "tracing")]
impl Notifier for TracingNotifier {
    fn notify_error(&self, message: &str) {
        tracing::warn!(target: "knowledge_base_client::notify", "{message}");
    }
}
