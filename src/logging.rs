//! Logging seam for machines and bindings.
//!
//! Every message goes through a [`Logger`] so hosts can route them
//! elsewhere; the default [`TracingLogger`] emits `tracing` events with
//! structured fields.

use serde::{Deserialize, Serialize};
use std::error::Error;
use tracing::{debug, error, info};

/// Categories of messages a binding can be asked to log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Machine transitions and lifecycle of the interaction.
    Interaction,
    /// Binding decisions: predicates, callbacks, counters.
    Binding,
    /// Command creation, execution and registration.
    Command,
    /// Start and end of each use of a binding, with its duration.
    Usage,
}

pub trait Logger {
    fn interaction_msg(&self, interaction: &str, msg: &str);

    fn binding_msg(&self, binding: &str, msg: &str);

    fn command_msg(&self, command: &str, msg: &str);

    fn binding_error(&self, binding: &str, msg: &str, err: &dyn Error);

    fn usage_start(&self, binding: &str);

    fn usage_end(&self, binding: &str, elapsed_ms: i64, cancelled: bool);
}

/// Emits every message as a `tracing` event.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn interaction_msg(&self, interaction: &str, msg: &str) {
        debug!(interaction, "{msg}");
    }

    fn binding_msg(&self, binding: &str, msg: &str) {
        debug!(binding, "{msg}");
    }

    fn command_msg(&self, command: &str, msg: &str) {
        debug!(command, "{msg}");
    }

    fn binding_error(&self, binding: &str, msg: &str, err: &dyn Error) {
        error!(binding, error = %err, "{msg}");
    }

    fn usage_start(&self, binding: &str) {
        info!(binding, "Usage started");
    }

    fn usage_end(&self, binding: &str, elapsed_ms: i64, cancelled: bool) {
        info!(binding, elapsed_ms, cancelled, "Usage ended");
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn interaction_msg(&self, _: &str, _: &str) {}

    fn binding_msg(&self, _: &str, _: &str) {}

    fn command_msg(&self, _: &str, _: &str) {}

    fn binding_error(&self, _: &str, _: &str, _: &dyn Error) {}

    fn usage_start(&self, _: &str) {}

    fn usage_end(&self, _: &str, _: i64, _: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandError;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn tracing_logger_emits_structured_fields() {
        let logger = TracingLogger;
        logger.usage_end("drag-to-move", 42, false);

        assert!(logs_contain("Usage ended"));
        assert!(logs_contain("binding=\"drag-to-move\""));
        assert!(logs_contain("elapsed_ms=42"));
    }

    #[traced_test]
    #[test]
    fn binding_errors_carry_the_cause() {
        let logger = TracingLogger;
        let err = CommandError::CreationFailed("no selection".to_string());
        logger.binding_error("delete", "Command creation failed", &err);

        assert!(logs_contain("Command creation failed"));
        assert!(logs_contain("no selection"));
    }

    #[test]
    fn log_levels_deserialize_from_snake_case() {
        let levels: Vec<LogLevel> = serde_json::from_str(r#"["usage", "command"]"#).unwrap();
        assert_eq!(levels, vec![LogLevel::Usage, LogLevel::Command]);
    }
}
