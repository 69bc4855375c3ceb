use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancel switch for one ingestion run. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = CancellationFlag::new();
        let worker_view = flag.clone();

        assert!(!worker_view.is_cancelled());
        flag.cancel();
        assert!(worker_view.is_cancelled());
    }
}
