//! Observability subsystem for docsql
//!
//! - Structured logging (JSON lines)
//! - Counter metrics owned by the store handle
//! - Typed lifecycle events
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. No async or background threads
//!
//! # Usage
//!
//! ```ignore
//! use docsql::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::DocumentInserted, &[("type", "movie")]);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
///
/// Routine events go out at INFO; fatal-class events at FATAL.
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_fatal() {
        Severity::Fatal
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

/// Log an event at WARN regardless of its class
pub fn warn_event(event: Event, fields: &[(&str, &str)]) {
    Logger::warn(event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        // Verifies no panic at any threshold
        log_event(Event::DatabaseOpen);
        log_event(Event::ConsistencyFault);
    }

    #[test]
    fn test_log_event_with_fields() {
        log_event_with_fields(Event::SchemaRegistered, &[("type", "movie")]);
        warn_event(Event::IndexRowBackfilled, &[("id", "x")]);
    }
}
