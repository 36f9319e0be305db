//! The notice dispatcher — one logical pass over the outdated set.
//!
//! Per-user failures are recorded and skipped; only a failure to list the
//! outdated set aborts the pass. A user counts as notified only once the
//! delivery is confirmed AND recorded, so a recording failure costs at
//! most one duplicate notice on the next pass, never a lost one.

use std::sync::Arc;

use accord_core::{
    ConsentError, ConsentResult, ConsentStateStore, LinkToken, MessagingSender, NoticeContent,
    Templater,
};
use serde_json::json;

use crate::types::{CancelToken, DispatchFailure, DispatchReport, DispatchStage, NoticeConfig};

pub struct NoticeDispatcher {
    store: Arc<dyn ConsentStateStore>,
    sender: Arc<dyn MessagingSender>,
    templater: Arc<dyn Templater>,
    config: NoticeConfig,
}

impl NoticeDispatcher {
    pub fn new(
        store: Arc<dyn ConsentStateStore>,
        sender: Arc<dyn MessagingSender>,
        templater: Arc<dyn Templater>,
        config: NoticeConfig,
    ) -> Self {
        Self {
            store,
            sender,
            templater,
            config,
        }
    }

    /// Run one dispatch pass.
    ///
    /// Only the initial outdated-set listing is fatal. The cancel token is
    /// checked before each user; a cancelled pass returns the partial
    /// report with `cancelled` set.
    pub fn dispatch(&self, cancel: &CancelToken) -> ConsentResult<DispatchReport> {
        let current = &self.config.current_version;
        let outdated = self.store.outdated_users(current)?;

        if !outdated.is_empty() {
            tracing::info!(
                count = outdated.len(),
                version = %current,
                "sending policy notices to users on an outdated version"
            );
        }

        let mut report = DispatchReport {
            outdated: outdated.len(),
            ..DispatchReport::default()
        };

        for user in outdated {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if user == self.config.sender {
                continue;
            }

            let url = match LinkToken::mint(user.clone(), current.clone(), &self.config.secret)
                .and_then(|token| token.consent_url(&self.config.base_url))
            {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(user = %user, error = %e, "unable to build consent link");
                    report.failures.push(DispatchFailure {
                        user,
                        stage: DispatchStage::BuildLink,
                        error: e,
                    });
                    continue;
                }
            };

            let body = match self.render_notice_body(&url) {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(user = %user, error = %e, "unable to render policy notice");
                    report.failures.push(DispatchFailure {
                        user,
                        stage: DispatchStage::RenderNotice,
                        error: e,
                    });
                    continue;
                }
            };

            let content = NoticeContent {
                msgtype: self.config.msgtype.clone(),
                body,
            };
            if let Err(e) = self.sender.send(&user, &content) {
                tracing::warn!(user = %user, error = %e, "failed to send policy notice");
                report.failures.push(DispatchFailure {
                    user,
                    stage: DispatchStage::Delivery,
                    error: e,
                });
                continue;
            }

            // Delivery confirmed. Record it so the next pass skips this
            // user; a failure here costs one duplicate notice at most.
            if let Err(e) = self.store.update_accepted_version(&user, current, true) {
                tracing::warn!(user = %user, error = %e, "failed to record delivered notice");
                report.failures.push(DispatchFailure {
                    user,
                    stage: DispatchStage::RecordUpdate,
                    error: e,
                });
                continue;
            }

            report.notified += 1;
        }

        if report.notified > 0 {
            tracing::info!(count = report.notified, "sent policy notices");
        }
        Ok(report)
    }

    fn render_notice_body(&self, consent_url: &str) -> ConsentResult<String> {
        let data = json!({ "consent_url": consent_url });
        let bytes = self.templater.render(&self.config.template, &data)?;
        String::from_utf8(bytes)
            .map_err(|e| ConsentError::Render(format!("notice body is not UTF-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_core::{FormSecret, PolicyVersion, UserId};
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct MockStore {
        outdated: Vec<UserId>,
        fail_listing: bool,
        fail_update_for: HashSet<UserId>,
        updates: Mutex<Vec<(UserId, PolicyVersion, bool)>>,
    }

    impl MockStore {
        fn with_outdated(users: &[&UserId]) -> Self {
            Self {
                outdated: users.iter().map(|u| (*u).clone()).collect(),
                fail_listing: false,
                fail_update_for: HashSet::new(),
                updates: Mutex::new(Vec::new()),
            }
        }

        fn updated_users(&self) -> Vec<UserId> {
            self.updates
                .lock()
                .unwrap()
                .iter()
                .map(|(u, _, _)| u.clone())
                .collect()
        }
    }

    impl ConsentStateStore for MockStore {
        fn accepted_version(&self, _user: &UserId) -> ConsentResult<Option<PolicyVersion>> {
            Ok(None)
        }

        fn update_accepted_version(
            &self,
            user: &UserId,
            version: &PolicyVersion,
            notice_triggered: bool,
        ) -> ConsentResult<()> {
            if self.fail_update_for.contains(user) {
                return Err(ConsentError::Storage("update rejected".into()));
            }
            self.updates
                .lock()
                .unwrap()
                .push((user.clone(), version.clone(), notice_triggered));
            Ok(())
        }

        fn outdated_users(&self, _current: &PolicyVersion) -> ConsentResult<Vec<UserId>> {
            if self.fail_listing {
                return Err(ConsentError::Storage("listing failed".into()));
            }
            Ok(self.outdated.clone())
        }
    }

    struct MockSender {
        fail_for: HashSet<UserId>,
        sent: Mutex<Vec<(UserId, NoticeContent)>>,
    }

    impl MockSender {
        fn new() -> Self {
            Self {
                fail_for: HashSet::new(),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn failing_for(user: &UserId) -> Self {
            let mut sender = Self::new();
            sender.fail_for.insert(user.clone());
            sender
        }

        fn recipients(&self) -> Vec<UserId> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(u, _)| u.clone())
                .collect()
        }
    }

    impl MessagingSender for MockSender {
        fn send(&self, recipient: &UserId, content: &NoticeContent) -> ConsentResult<()> {
            if self.fail_for.contains(recipient) {
                return Err(ConsentError::Dispatch("delivery refused".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((recipient.clone(), content.clone()));
            Ok(())
        }
    }

    struct MockTemplater {
        fail: bool,
    }

    impl Templater for MockTemplater {
        fn render(&self, _name: &str, data: &serde_json::Value) -> ConsentResult<Vec<u8>> {
            if self.fail {
                return Err(ConsentError::Render("template missing".into()));
            }
            let url = data["consent_url"].as_str().unwrap_or_default();
            Ok(format!("please review the policy: {url}").into_bytes())
        }
    }

    fn user(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn config() -> NoticeConfig {
        NoticeConfig {
            current_version: PolicyVersion::new("2.0"),
            base_url: "https://example.org".into(),
            secret: FormSecret::new("s3cr3t"),
            sender: user("@notices:example.org"),
            template: "server_notice".into(),
            msgtype: "m.text".into(),
        }
    }

    fn dispatcher(store: MockStore, sender: MockSender, templater: MockTemplater) -> NoticeDispatcher {
        NoticeDispatcher::new(Arc::new(store), Arc::new(sender), Arc::new(templater), config())
    }

    #[test]
    fn test_full_pass_notifies_and_records_everyone() {
        let (u1, u2) = (user("@u1:example.org"), user("@u2:example.org"));
        let store = Arc::new(MockStore::with_outdated(&[&u1, &u2]));
        let sender = Arc::new(MockSender::new());
        let dispatcher = NoticeDispatcher::new(
            store.clone(),
            sender.clone(),
            Arc::new(MockTemplater { fail: false }),
            config(),
        );

        let report = dispatcher.dispatch(&CancelToken::new()).unwrap();
        assert_eq!(report.outdated, 2);
        assert_eq!(report.notified, 2);
        assert!(report.failures.is_empty());
        assert!(!report.cancelled);

        assert_eq!(sender.recipients(), vec![u1.clone(), u2.clone()]);
        assert_eq!(store.updated_users(), vec![u1, u2]);
        // every recorded update carries the notice-triggered flag
        assert!(store.updates.lock().unwrap().iter().all(|(_, v, flag)| {
            *v == PolicyVersion::new("2.0") && *flag
        }));
    }

    #[test]
    fn test_delivery_failure_skips_user_without_mutation() {
        let (u1, u2, u3) = (
            user("@u1:example.org"),
            user("@u2:example.org"),
            user("@u3:example.org"),
        );
        let store = Arc::new(MockStore::with_outdated(&[&u1, &u2, &u3]));
        let sender = Arc::new(MockSender::failing_for(&u2));
        let dispatcher = NoticeDispatcher::new(
            store.clone(),
            sender,
            Arc::new(MockTemplater { fail: false }),
            config(),
        );

        let report = dispatcher.dispatch(&CancelToken::new()).unwrap();
        assert_eq!(report.notified, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].user, u2);
        assert_eq!(report.failures[0].stage, DispatchStage::Delivery);

        // u2 was never recorded, so it stays in the outdated set next pass
        assert_eq!(store.updated_users(), vec![u1, u3]);
    }

    #[test]
    fn test_sender_identity_is_never_noticed() {
        let notices = user("@notices:example.org");
        let u1 = user("@u1:example.org");
        let store = Arc::new(MockStore::with_outdated(&[&notices, &u1]));
        let sender = Arc::new(MockSender::new());
        let dispatcher = NoticeDispatcher::new(
            store.clone(),
            sender.clone(),
            Arc::new(MockTemplater { fail: false }),
            config(),
        );

        let report = dispatcher.dispatch(&CancelToken::new()).unwrap();
        assert_eq!(report.notified, 1);
        assert!(report.failures.is_empty());
        assert_eq!(sender.recipients(), vec![u1]);
    }

    #[test]
    fn test_listing_failure_aborts_the_pass() {
        let mut store = MockStore::with_outdated(&[]);
        store.fail_listing = true;
        let dispatcher = dispatcher(store, MockSender::new(), MockTemplater { fail: false });

        let err = dispatcher.dispatch(&CancelToken::new()).unwrap_err();
        assert!(matches!(err, ConsentError::Storage(_)));
    }

    #[test]
    fn test_template_failure_skips_user_and_continues() {
        let (u1, u2) = (user("@u1:example.org"), user("@u2:example.org"));
        let store = Arc::new(MockStore::with_outdated(&[&u1, &u2]));
        let sender = Arc::new(MockSender::new());
        let dispatcher = NoticeDispatcher::new(
            store.clone(),
            sender.clone(),
            Arc::new(MockTemplater { fail: true }),
            config(),
        );

        let report = dispatcher.dispatch(&CancelToken::new()).unwrap();
        assert_eq!(report.notified, 0);
        assert_eq!(report.failures.len(), 2);
        assert!(report
            .failures
            .iter()
            .all(|f| f.stage == DispatchStage::RenderNotice));
        assert!(sender.recipients().is_empty());
        assert!(store.updated_users().is_empty());
    }

    #[test]
    fn test_record_failure_does_not_count_as_notified() {
        let (u1, u2) = (user("@u1:example.org"), user("@u2:example.org"));
        let mut store = MockStore::with_outdated(&[&u1, &u2]);
        store.fail_update_for.insert(u1.clone());
        let store = Arc::new(store);
        let sender = Arc::new(MockSender::new());
        let dispatcher = NoticeDispatcher::new(
            store.clone(),
            sender.clone(),
            Arc::new(MockTemplater { fail: false }),
            config(),
        );

        let report = dispatcher.dispatch(&CancelToken::new()).unwrap();
        // the notice to u1 went out but could not be recorded
        assert_eq!(sender.recipients(), vec![u1.clone(), u2.clone()]);
        assert_eq!(report.notified, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].stage, DispatchStage::RecordUpdate);
        assert_eq!(store.updated_users(), vec![u2]);
    }

    #[test]
    fn test_cancelled_pass_reports_partial_progress() {
        let (u1, u2) = (user("@u1:example.org"), user("@u2:example.org"));
        let store = Arc::new(MockStore::with_outdated(&[&u1, &u2]));
        let sender = Arc::new(MockSender::new());
        let dispatcher = NoticeDispatcher::new(
            store.clone(),
            sender,
            Arc::new(MockTemplater { fail: false }),
            config(),
        );

        let cancel = CancelToken::new();
        cancel.cancel();
        let report = dispatcher.dispatch(&cancel).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.notified, 0);
        assert_eq!(report.outdated, 2);
        assert!(store.updated_users().is_empty());
    }

    #[test]
    fn test_malformed_base_url_is_per_user_build_failure() {
        let u1 = user("@u1:example.org");
        let store = Arc::new(MockStore::with_outdated(&[&u1]));
        let mut cfg = config();
        cfg.base_url = "example.org".into();
        let dispatcher = NoticeDispatcher::new(
            store.clone(),
            Arc::new(MockSender::new()),
            Arc::new(MockTemplater { fail: false }),
            cfg,
        );

        let report = dispatcher.dispatch(&CancelToken::new()).unwrap();
        assert_eq!(report.notified, 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].stage, DispatchStage::BuildLink);
    }

    #[test]
    fn test_empty_outdated_set_is_a_quiet_pass() {
        let dispatcher = dispatcher(
            MockStore::with_outdated(&[]),
            MockSender::new(),
            MockTemplater { fail: false },
        );
        let report = dispatcher.dispatch(&CancelToken::new()).unwrap();
        assert_eq!(report, DispatchReport::default());
    }
}
