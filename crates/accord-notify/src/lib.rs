//! Batch policy-notice dispatch.
//!
//! The dispatcher walks every user whose recorded state is behind the
//! current policy version, mints a signed consent link for each, hands the
//! rendered notice to the messaging collaborator, and records confirmed
//! deliveries so the next pass skips them. Per-user failures never abort
//! the batch.

pub mod dispatcher;
pub mod types;

pub use dispatcher::NoticeDispatcher;
pub use types::{CancelToken, DispatchFailure, DispatchReport, DispatchStage, NoticeConfig};
