//! Tracing-info carrier shared between RPC envelopes and sink chunks.

use std::collections::HashMap;

/// String map propagated alongside a payload so the receiving side can
/// correlate its work with the sender's span.
pub type TracingInfo = HashMap<String, String>;

pub const TAG_SPAN_ID: &str = "span-id";
pub const TAG_LOCATION: &str = "location";
pub const TAG_SYSTEM_ID: &str = "systemId";
pub const TAG_THREAD: &str = "thread";
pub const TAG_DESTINATION: &str = "destination";
pub const TAG_MESSAGE_SIZE: &str = "messageSize";

/// Write the id of `span` into the carrier. Disabled spans carry no id.
pub fn inject_span(info: &mut TracingInfo, span: &tracing::Span) {
    if let Some(id) = span.id() {
        info.insert(TAG_SPAN_ID.to_string(), id.into_u64().to_string());
    }
}

/// Name of the current thread, or `unnamed` for anonymous threads.
pub fn current_thread_name() -> String {
    std::thread::current()
        .name()
        .unwrap_or("unnamed")
        .to_string()
}
