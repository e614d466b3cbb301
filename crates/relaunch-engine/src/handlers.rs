use relaunch_core::model::{AttemptRecord, ErrorHandlerReport};

/// A diagnosis function. It inspects a finished-but-failed attempt and
/// either proposes a response or declines (`None`). Handlers are pure: they
/// never touch the snapshot, they only return mutation instructions for the
/// controller to apply.
pub type ErrorHandlerFn = Box<dyn Fn(&AttemptRecord) -> Option<ErrorHandlerReport> + Send + Sync>;

struct RegisteredHandler {
    priority: u32,
    name: &'static str,
    handler: ErrorHandlerFn,
}

/// Ordered collection of diagnosis functions, consulted in ascending
/// priority order. The first handler that claims a failure governs the
/// response; evaluation stops there.
#[derive(Default)]
pub struct ErrorHandlerRegistry {
    handlers: Vec<RegisteredHandler>,
}

impl ErrorHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn register(
        &mut self,
        priority: u32,
        name: &'static str,
        handler: impl Fn(&AttemptRecord) -> Option<ErrorHandlerReport> + Send + Sync + 'static,
    ) {
        self.handlers.push(RegisteredHandler {
            priority,
            name,
            handler: Box::new(handler),
        });
        // Stable sort keeps registration order among equal priorities.
        self.handlers.sort_by_key(|h| h.priority);
    }

    /// Classifies a failed attempt. Returns the first report with
    /// `handled = true`, stamped with the claiming handler's priority, or
    /// the default unhandled report when no handler claims it.
    pub fn classify(&self, attempt: &AttemptRecord) -> ErrorHandlerReport {
        for registered in &self.handlers {
            if let Some(mut report) = (registered.handler)(attempt) {
                if report.handled {
                    report.priority = Some(registered.priority);
                    tracing::debug!(
                        "handler '{}' (priority {}) claimed attempt {} ({})",
                        registered.name,
                        registered.priority,
                        attempt.sequence,
                        attempt.outcome.failure_kind.as_deref().unwrap_or("?"),
                    );
                    return report;
                }
            }
        }

        tracing::debug!(
            "no handler claimed attempt {} ({})",
            attempt.sequence,
            attempt.outcome.failure_kind.as_deref().unwrap_or("?"),
        );
        ErrorHandlerReport::unhandled()
    }
}
