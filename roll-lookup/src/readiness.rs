use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;

/// Closed until the roll has been fully ingested. Lookups arriving while it
/// is closed are turned away instead of queued.
#[derive(Clone, Debug, Default)]
pub struct ReadinessGate {
    ready: Arc<AtomicBool>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Axum-compatible probe; 200 once ready, 503 before.
    pub async fn check(&self) -> StatusCode {
        if self.is_ready() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gate_opens_once_for_every_clone() {
        let gate = ReadinessGate::new();
        let shared = gate.clone();

        assert!(!shared.is_ready());
        assert_eq!(shared.check().await, StatusCode::SERVICE_UNAVAILABLE);

        gate.mark_ready();

        assert!(shared.is_ready());
        assert_eq!(shared.check().await, StatusCode::OK);
    }
}
