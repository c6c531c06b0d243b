//! Cooperative cancellation, checked between blocks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A handle shared between the caller and a running simulation. Setting it
/// does not stop the run immediately: the integrator only checks it at
/// block boundaries, never between individual spin updates.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::CancelToken;
    use assert2::check;

    #[test]
    fn cancel_is_visible_through_clone() {
        let token = CancelToken::new();
        let clone = token.clone();
        check!(!clone.is_cancelled());
        token.cancel();
        check!(clone.is_cancelled());
    }
}
