//! Outbox spool sender.
//!
//! Notice delivery transport is an external concern. This sender appends
//! one JSON line per confirmed notice to a spool file that a delivery
//! agent consumes; an append that reaches disk counts as confirmed
//! hand-off.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use accord_core::{ConsentError, ConsentResult, MessagingSender, NoticeContent, UserId};
use serde::Serialize;

pub struct OutboxSender {
    path: PathBuf,
    // serialize appends so concurrent dispatchers cannot interleave lines
    write_lock: Mutex<()>,
}

#[derive(Debug, Serialize)]
struct OutboxEntry<'a> {
    recipient: &'a str,
    msgtype: &'a str,
    body: &'a str,
    queued_at: String,
}

impl OutboxSender {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl MessagingSender for OutboxSender {
    fn send(&self, recipient: &UserId, content: &NoticeContent) -> ConsentResult<()> {
        let entry = OutboxEntry {
            recipient: recipient.as_str(),
            msgtype: &content.msgtype,
            body: &content.body,
            queued_at: chrono::Utc::now().to_rfc3339(),
        };
        let line = serde_json::to_string(&entry)
            .map_err(|e| ConsentError::Dispatch(format!("encode notice: {e}")))?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| ConsentError::Dispatch(format!("lock poisoned: {e}")))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ConsentError::Dispatch(format!("open outbox: {e}")))?;
        writeln!(file, "{line}").map_err(|e| ConsentError::Dispatch(format!("append notice: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn user(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn content() -> NoticeContent {
        NoticeContent {
            msgtype: "m.text".into(),
            body: "please review the policy".into(),
        }
    }

    #[test]
    fn test_send_appends_one_json_line_per_notice() {
        let dir = std::env::temp_dir().join("accord-test-outbox");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("outbox.jsonl");

        let sender = OutboxSender::new(&path);
        sender.send(&user("@alice:example.org"), &content()).unwrap();
        sender.send(&user("@bob:example.org"), &content()).unwrap();

        let spool = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = spool.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["recipient"], "@alice:example.org");
        assert_eq!(first["msgtype"], "m.text");
        assert_eq!(first["body"], "please review the policy");
        assert!(first["queued_at"].as_str().unwrap().contains('T'));

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["recipient"], "@bob:example.org");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_send_to_unwritable_path_is_dispatch_error() {
        let sender = OutboxSender::new("/nonexistent-dir/outbox.jsonl");
        let err = sender.send(&user("@alice:example.org"), &content()).unwrap_err();
        assert!(matches!(err, ConsentError::Dispatch(_)));
    }
}
