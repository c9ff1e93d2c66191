use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Raised when the process has been asked to terminate.
///
/// Signal handlers only store into the shared cell. The post-resolve cycle
/// reads it around the resolver step and stops once the snapshot is back on
/// disk.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    raised: Arc<AtomicBool>,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cell to hand to a signal handler registration.
    pub fn shared(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.raised)
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}
