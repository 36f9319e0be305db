use accord_core::{ConsentError, ConsentRecord, ConsentResult, ConsentStateStore, PolicyVersion, UserId};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory consent store.
///
/// Useful for testing and for deployments where consent state does not
/// need to survive a restart.
pub struct MemoryConsentStore {
    records: Mutex<HashMap<UserId, RecordState>>,
}

#[derive(Default, Clone)]
struct RecordState {
    accepted: Option<PolicyVersion>,
    last_notice: Option<PolicyVersion>,
}

fn lock_records(
    mutex: &Mutex<HashMap<UserId, RecordState>>,
) -> ConsentResult<std::sync::MutexGuard<'_, HashMap<UserId, RecordState>>> {
    mutex
        .lock()
        .map_err(|e| ConsentError::Storage(format!("lock poisoned: {e}")))
}

impl MemoryConsentStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Ensure a record exists for a user without touching its versions.
    /// This is how an account-provisioning step feeds the store.
    pub fn register(&self, user: &UserId) -> ConsentResult<()> {
        let mut records = lock_records(&self.records)?;
        records.entry(user.clone()).or_default();
        Ok(())
    }

    /// Full record for a user (for inspection in tests).
    pub fn record(&self, user: &UserId) -> ConsentResult<Option<ConsentRecord>> {
        let records = lock_records(&self.records)?;
        Ok(records.get(user).map(|state| ConsentRecord {
            user: user.clone(),
            accepted_version: state.accepted.clone(),
            last_notice_version: state.last_notice.clone(),
        }))
    }

    /// Number of stored records.
    pub fn count(&self) -> usize {
        lock_records(&self.records).map(|r| r.len()).unwrap_or(0)
    }
}

impl Default for MemoryConsentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsentStateStore for MemoryConsentStore {
    fn accepted_version(&self, user: &UserId) -> ConsentResult<Option<PolicyVersion>> {
        let records = lock_records(&self.records)?;
        Ok(records.get(user).and_then(|state| state.accepted.clone()))
    }

    fn update_accepted_version(
        &self,
        user: &UserId,
        version: &PolicyVersion,
        notice_triggered: bool,
    ) -> ConsentResult<()> {
        let mut records = lock_records(&self.records)?;
        let state = records.entry(user.clone()).or_default();
        if notice_triggered {
            state.last_notice = Some(version.clone());
        } else {
            state.accepted = Some(version.clone());
        }
        Ok(())
    }

    fn outdated_users(&self, current: &PolicyVersion) -> ConsentResult<Vec<UserId>> {
        let records = lock_records(&self.records)?;
        let mut outdated: Vec<UserId> = records
            .iter()
            .filter(|(_, state)| {
                state.accepted.as_ref() != Some(current)
                    && state.last_notice.as_ref() != Some(current)
            })
            .map(|(user, _)| user.clone())
            .collect();
        // HashMap iteration order is arbitrary; keep batches deterministic
        outdated.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(outdated)
    }
}
