use crate::error::ConsentResult;
use crate::types::{NoticeContent, PolicyVersion, UserId};

// ---------------------------------------------------------------------------
// ConsentStateStore — per-user acceptance state
//
// The store owns its own consistency. Each write targets a single user's
// single field and last-write-wins is the accepted semantics, so no
// cross-request locking is required of callers.
// ---------------------------------------------------------------------------

pub trait ConsentStateStore: Send + Sync {
    /// The policy version the user last explicitly accepted, if any.
    fn accepted_version(&self, user: &UserId) -> ConsentResult<Option<PolicyVersion>>;

    /// Record a version for a user, creating the record if absent.
    ///
    /// `notice_triggered = false` records an explicit acceptance;
    /// `notice_triggered = true` records that a notice for this version
    /// was delivered, without forging acceptance.
    fn update_accepted_version(
        &self,
        user: &UserId,
        version: &PolicyVersion,
        notice_triggered: bool,
    ) -> ConsentResult<()>;

    /// Users whose accepted version differs from `current` and who have
    /// not already been sent a notice for `current`.
    fn outdated_users(&self, current: &PolicyVersion) -> ConsentResult<Vec<UserId>>;
}

// ---------------------------------------------------------------------------
// MessagingSender — notice delivery hand-off
// ---------------------------------------------------------------------------

pub trait MessagingSender: Send + Sync {
    /// Deliver a notice to a user. Implementations carry their own
    /// timeouts; an `Ok` return means delivery was confirmed.
    fn send(&self, recipient: &UserId, content: &NoticeContent) -> ConsentResult<()>;
}

// ---------------------------------------------------------------------------
// Templater — pure name + data -> bytes rendering
// ---------------------------------------------------------------------------

pub trait Templater: Send + Sync {
    fn render(&self, name: &str, data: &serde_json::Value) -> ConsentResult<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Verify the trait objects are object-safe
    fn _assert_store_object_safe(_: &dyn ConsentStateStore) {}
    fn _assert_sender_object_safe(_: &dyn MessagingSender) {}
    fn _assert_templater_object_safe(_: &dyn Templater) {}

    #[test]
    fn test_traits_are_usable_as_objects() {
        struct Nothing;

        impl Templater for Nothing {
            fn render(&self, _name: &str, _data: &serde_json::Value) -> ConsentResult<Vec<u8>> {
                Ok(Vec::new())
            }
        }

        let t: &dyn Templater = &Nothing;
        assert!(t.render("x", &serde_json::Value::Null).unwrap().is_empty());
    }
}
