use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroize;

use crate::error::{ConsentError, ConsentResult};

// ---------------------------------------------------------------------------
// UserId — canonical `@localpart:server` identity
// ---------------------------------------------------------------------------

/// A user identity of the form `@localpart:server`.
///
/// The canonical string (the exact bytes that were parsed) is preserved:
/// it is what link signatures cover, so `Display` must reproduce it
/// byte-for-byte. Invalid strings are rejected, never truncated.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId {
    raw: String,
    colon: usize,
}

impl UserId {
    /// Parse a canonical `@localpart:server` string.
    pub fn parse(s: &str) -> ConsentResult<Self> {
        let rest = s
            .strip_prefix('@')
            .ok_or_else(|| ConsentError::Validation(format!("user id missing @ sigil: {s}")))?;
        let colon_in_rest = rest
            .find(':')
            .ok_or_else(|| ConsentError::Validation(format!("user id missing server name: {s}")))?;
        let (localpart, server) = (&rest[..colon_in_rest], &rest[colon_in_rest + 1..]);
        if localpart.is_empty() {
            return Err(ConsentError::Validation(format!(
                "user id has empty localpart: {s}"
            )));
        }
        if server.is_empty() {
            return Err(ConsentError::Validation(format!(
                "user id has empty server name: {s}"
            )));
        }
        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ConsentError::Validation(format!(
                "user id contains whitespace or control characters: {s}"
            )));
        }
        Ok(Self {
            raw: s.to_string(),
            colon: colon_in_rest + 1,
        })
    }

    /// The canonical string form. These are the bytes link signatures cover.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn localpart(&self) -> &str {
        &self.raw[1..self.colon]
    }

    pub fn server_name(&self) -> &str {
        &self.raw[self.colon + 1..]
    }
}

impl FromStr for UserId {
    type Err = ConsentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = ConsentError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> String {
        id.raw
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.raw)
    }
}

// ---------------------------------------------------------------------------
// PolicyVersion — opaque version token, equality only
// ---------------------------------------------------------------------------

/// An opaque label identifying a revision of the policy document.
///
/// Versions are compared by equality only: "outdated" means "not equal to
/// current", never "less than". There is deliberately no `Ord` impl.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyVersion(String);

impl PolicyVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PolicyVersion {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PolicyVersion {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// FormSecret — HMAC key material for consent links
// ---------------------------------------------------------------------------

/// The shared secret consent-link signatures are keyed with.
///
/// Never serialized, redacted in Debug output, zeroized on drop.
#[derive(Clone)]
pub struct FormSecret {
    key_bytes: Vec<u8>,
}

impl FormSecret {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key_bytes: secret.as_ref().to_vec(),
        }
    }

    pub fn key_bytes(&self) -> &[u8] {
        &self.key_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.key_bytes.is_empty()
    }
}

impl fmt::Debug for FormSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FormSecret([REDACTED])")
    }
}

impl Drop for FormSecret {
    fn drop(&mut self) {
        self.key_bytes.zeroize();
    }
}

// ---------------------------------------------------------------------------
// ConsentRecord — per-user acceptance state
// ---------------------------------------------------------------------------

/// The per-user state held by a consent store.
///
/// `accepted_version` changes only on explicit user acceptance;
/// `last_notice_version` changes only when the dispatcher confirms a
/// notice delivery. Records are created implicitly on first write and
/// never deleted by this subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub user: UserId,
    pub accepted_version: Option<PolicyVersion>,
    pub last_notice_version: Option<PolicyVersion>,
}

impl ConsentRecord {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            accepted_version: None,
            last_notice_version: None,
        }
    }
}

// ---------------------------------------------------------------------------
// NoticeContent — the message handed to a MessagingSender
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeContent {
    pub msgtype: String,
    pub body: String,
}
