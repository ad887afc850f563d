//! Violation and output notification channels
//!
//! Handlers are invoked synchronously on whichever worker or orchestrator
//! thread produced the event, so they must be `Send + Sync`.

use crate::violation::Violation;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Importance of an output message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLevel {
    Info,
    Warning,
}

/// A free-form message produced during initialization or a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEvent {
    pub level: OutputLevel,
    pub message: String,
}

impl OutputEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: OutputLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: OutputLevel::Warning,
            message: message.into(),
        }
    }
}

impl fmt::Display for OutputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

type ViolationHandler = Arc<dyn Fn(&Violation) + Send + Sync>;
type OutputHandler = Arc<dyn Fn(&OutputEvent) + Send + Sync>;

/// Subscriber lists for `ViolationEncountered` and `OutputGenerated`
#[derive(Default)]
pub struct EventHub {
    violation_handlers: RwLock<Vec<ViolationHandler>>,
    output_handlers: RwLock<Vec<OutputHandler>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_violation(&self, handler: impl Fn(&Violation) + Send + Sync + 'static) {
        self.violation_handlers.write().push(Arc::new(handler));
    }

    pub fn on_output(&self, handler: impl Fn(&OutputEvent) + Send + Sync + 'static) {
        self.output_handlers.write().push(Arc::new(handler));
    }

    pub fn violation_encountered(&self, violation: &Violation) {
        // Snapshot so a handler may subscribe without deadlocking
        let handlers = self.violation_handlers.read().clone();
        for handler in handlers {
            handler(violation);
        }
    }

    pub fn output_generated(&self, event: OutputEvent) {
        let handlers = self.output_handlers.read().clone();
        for handler in handlers {
            handler(&event);
        }
    }

    pub fn subscriber_count(&self) -> (usize, usize) {
        (
            self.violation_handlers.read().len(),
            self.output_handlers.read().len(),
        )
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (violations, outputs) = self.subscriber_count();
        f.debug_struct("EventHub")
            .field("violation_handlers", &violations)
            .field("output_handlers", &outputs)
            .finish()
    }
}
