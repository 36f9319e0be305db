use accord_core::{ConsentError, ConsentResult, ConsentStateStore, PolicyVersion, UserId};
use rusqlite::{params, Connection};
use std::sync::Mutex;

/// SQLite-backed consent store.
///
/// One row per user. `accepted_version` and `last_notice_version` are
/// written independently; rows are created implicitly on first write.
pub struct SqliteConsentStore {
    conn: Mutex<Connection>,
}

impl SqliteConsentStore {
    /// Open or create a database at the given path.
    pub fn open(path: &str) -> ConsentResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ConsentError::Storage(format!("failed to open database: {e}")))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS consent (
                user_id TEXT PRIMARY KEY NOT NULL,
                accepted_version TEXT,
                last_notice_version TEXT,
                updated_at TEXT DEFAULT (datetime('now'))
            );",
        )
        .map_err(|e| ConsentError::Storage(format!("failed to create tables: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> ConsentResult<Self> {
        Self::open(":memory:")
    }

    /// Ensure a row exists for a user without touching its versions.
    /// This is how an account-provisioning step feeds the store.
    pub fn register(&self, user: &UserId) -> ConsentResult<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO consent (user_id) VALUES (?1)",
            params![user.as_str()],
        )
        .map_err(|e| ConsentError::Storage(format!("insert failed: {e}")))?;
        Ok(())
    }

    fn lock_conn(&self) -> ConsentResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ConsentError::Storage(format!("lock poisoned: {e}")))
    }
}

impl ConsentStateStore for SqliteConsentStore {
    fn accepted_version(&self, user: &UserId) -> ConsentResult<Option<PolicyVersion>> {
        let conn = self.lock_conn()?;

        let result: Result<Option<String>, _> = conn.query_row(
            "SELECT accepted_version FROM consent WHERE user_id = ?1",
            params![user.as_str()],
            |row| row.get(0),
        );

        match result {
            Ok(version) => Ok(version.map(PolicyVersion::from)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(ConsentError::Storage(format!("query failed: {e}"))),
        }
    }

    fn update_accepted_version(
        &self,
        user: &UserId,
        version: &PolicyVersion,
        notice_triggered: bool,
    ) -> ConsentResult<()> {
        let conn = self.lock_conn()?;

        let sql = if notice_triggered {
            "INSERT INTO consent (user_id, last_notice_version) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE
             SET last_notice_version = ?2, updated_at = datetime('now')"
        } else {
            "INSERT INTO consent (user_id, accepted_version) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE
             SET accepted_version = ?2, updated_at = datetime('now')"
        };

        conn.execute(sql, params![user.as_str(), version.as_str()])
            .map_err(|e| ConsentError::Storage(format!("update failed: {e}")))?;
        Ok(())
    }

    fn outdated_users(&self, current: &PolicyVersion) -> ConsentResult<Vec<UserId>> {
        let conn = self.lock_conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT user_id FROM consent
                 WHERE (accepted_version IS NULL OR accepted_version != ?1)
                   AND (last_notice_version IS NULL OR last_notice_version != ?1)
                 ORDER BY user_id",
            )
            .map_err(|e| ConsentError::Storage(format!("query failed: {e}")))?;

        let rows = stmt
            .query_map(params![current.as_str()], |row| row.get::<_, String>(0))
            .map_err(|e| ConsentError::Storage(format!("query failed: {e}")))?;

        let mut users = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| ConsentError::Storage(format!("row decode failed: {e}")))?;
            let user = UserId::parse(&raw)
                .map_err(|e| ConsentError::Storage(format!("corrupt user id in store: {e}")))?;
            users.push(user);
        }
        Ok(users)
    }
}
