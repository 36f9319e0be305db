use accord_core::{ConsentError, FormSecret, PolicyVersion, UserId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// NoticeConfig — everything a dispatch pass needs, injected explicitly
// ---------------------------------------------------------------------------

/// Configuration for a notice dispatch pass. No globals: the secret, the
/// current version, and the sender identity all arrive here.
#[derive(Debug, Clone)]
pub struct NoticeConfig {
    /// The policy version users must be brought up to.
    pub current_version: PolicyVersion,
    /// Base URL consent links are rendered against.
    pub base_url: String,
    /// Secret the link signatures are keyed with.
    pub secret: FormSecret,
    /// The identity notices are sent from. Never noticed itself.
    pub sender: UserId,
    /// Template name for the notice body.
    pub template: String,
    /// Message type stamped on outgoing notices.
    pub msgtype: String,
}

// ---------------------------------------------------------------------------
// CancelToken — cooperative cancellation for a dispatch pass
// ---------------------------------------------------------------------------

/// Shared flag checked before each per-user unit of work. Once set, the
/// dispatcher stops issuing new work and returns the partial report.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
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

// ---------------------------------------------------------------------------
// DispatchStage / DispatchFailure / DispatchReport
// ---------------------------------------------------------------------------

/// Where in the per-user pipeline a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchStage {
    /// Minting the token or rendering the consent URL.
    BuildLink,
    /// Rendering the notice body from the template.
    RenderNotice,
    /// Handing the notice to the messaging collaborator.
    Delivery,
    /// Recording the confirmed delivery in the store. The notice went
    /// out; the user may receive one extra on the next pass.
    RecordUpdate,
}

/// A single per-user failure. Never fatal to the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure {
    pub user: UserId,
    pub stage: DispatchStage,
    pub error: ConsentError,
}

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Size of the outdated set the pass started from.
    pub outdated: usize,
    /// Users successfully notified and recorded.
    pub notified: usize,
    /// Per-user failures, in encounter order.
    pub failures: Vec<DispatchFailure>,
    /// Whether the pass stopped early on cancellation.
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_starts_clear() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_dispatch_report_default() {
        let report = DispatchReport::default();
        assert_eq!(report.outdated, 0);
        assert_eq!(report.notified, 0);
        assert!(report.failures.is_empty());
        assert!(!report.cancelled);
    }

    #[test]
    fn test_dispatch_stage_serde() {
        let json = serde_json::to_string(&DispatchStage::Delivery).unwrap();
        assert_eq!(json, "\"Delivery\"");
        let back: DispatchStage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DispatchStage::Delivery);
    }
}
