use thiserror::Error;

/// Error type shared by every Accord crate.
///
/// Callers branch on the variant, never on message text. The `InvalidHmac`
/// message is part of the HTTP contract: it is written verbatim as the
/// response body when a signature check fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsentError {
    /// Malformed identity string, malformed signature hex, or an otherwise
    /// unusable parameter combination.
    #[error("validation error: {0}")]
    Validation(String),

    /// A signature was present but did not verify against the form secret.
    #[error("invalid HMAC provided")]
    InvalidHmac,

    /// A read or write against the consent state store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Template or message-body rendering failed.
    #[error("render error: {0}")]
    Render(String),

    /// A per-user failure during batch notification. Always non-fatal to
    /// the batch.
    #[error("dispatch error: {0}")]
    Dispatch(String),
}

/// Result type alias for Accord operations.
pub type ConsentResult<T> = Result<T, ConsentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_hmac_message_is_exact() {
        // The HTTP layer writes this string as the response body.
        assert_eq!(ConsentError::InvalidHmac.to_string(), "invalid HMAC provided");
    }

    #[test]
    fn test_variants_are_distinct() {
        let a = ConsentError::Validation("x".into());
        let b = ConsentError::Storage("x".into());
        let c = ConsentError::Render("x".into());
        let d = ConsentError::Dispatch("x".into());
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(c, d);
        assert_ne!(a, ConsentError::InvalidHmac);
    }

    #[test]
    fn test_error_clone_and_eq() {
        let e1 = ConsentError::Storage("connection refused".into());
        let e2 = e1.clone();
        assert_eq!(e1, e2);
    }

    #[test]
    fn test_display_carries_detail() {
        let err = ConsentError::Storage("disk full".into());
        assert_eq!(err.to_string(), "storage error: disk full");
    }
}
