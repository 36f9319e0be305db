//! The consent request state machine.
//!
//! Every request resolves to exactly one view:
//!
//! - `Public` — no identity proven; the policy is shown without
//!   personalization and the store is never touched.
//! - `Prompt` — identity proven, the current version not yet accepted.
//! - `Confirmed` — identity proven, the current version accepted.
//!
//! Whether the user "already consented" is always derived from the stored
//! accepted version compared against the server's own current version. The
//! `v` query parameter is not covered by the link signature and is never
//! trusted for that decision.

use std::sync::Arc;

use accord_core::{
    token, ConsentError, ConsentResult, ConsentStateStore, FormSecret, PolicyVersion, Templater,
    UserId,
};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Request parameters and views
// ---------------------------------------------------------------------------

/// The raw `(u, v, h)` query parameters; absent parameters arrive empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsentParams {
    pub user: String,
    pub version: String,
    pub hmac: String,
}

impl ConsentParams {
    /// Any missing parameter means the request carries no credentials.
    fn is_public(&self) -> bool {
        self.user.is_empty() || self.version.is_empty() || self.hmac.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentView {
    Public,
    Prompt,
    Confirmed,
}

/// One resolved request: the view that was decided and its rendered body.
#[derive(Debug, Clone)]
pub struct ConsentResponse {
    pub view: ConsentView,
    pub body: Vec<u8>,
}

/// Context handed to the policy template.
#[derive(Debug, Serialize)]
struct ConsentTemplateData<'a> {
    user: &'a str,
    version: &'a str,
    user_hmac: &'a str,
    has_consented: bool,
    public_version: bool,
}

// ---------------------------------------------------------------------------
// ConsentRequestHandler
// ---------------------------------------------------------------------------

/// Services inbound consent requests. One instance is shared across
/// concurrent requests; all state lives in the store.
pub struct ConsentRequestHandler {
    store: Arc<dyn ConsentStateStore>,
    templater: Arc<dyn Templater>,
    secret: FormSecret,
    current_version: PolicyVersion,
}

impl ConsentRequestHandler {
    pub fn new(
        store: Arc<dyn ConsentStateStore>,
        templater: Arc<dyn Templater>,
        secret: FormSecret,
        current_version: PolicyVersion,
    ) -> Self {
        Self {
            store,
            templater,
            secret,
            current_version,
        }
    }

    /// Read path: one store read, one render.
    pub fn get(&self, params: &ConsentParams) -> ConsentResult<ConsentResponse> {
        if params.is_public() {
            return self.render(ConsentView::Public, params);
        }

        let user = self.authenticate(params)?;
        let accepted = self.store.accepted_version(&user)?;
        let view = if accepted.as_ref() == Some(&self.current_version) {
            ConsentView::Confirmed
        } else {
            ConsentView::Prompt
        };
        self.render(view, params)
    }

    /// Write path: one store write, one render. A failed signature check
    /// rejects the request before any mutation.
    pub fn post(&self, params: &ConsentParams) -> ConsentResult<ConsentResponse> {
        if params.is_public() {
            return self.render(ConsentView::Public, params);
        }

        let user = self.authenticate(params)?;
        let version = PolicyVersion::new(params.version.clone());
        self.store.update_accepted_version(&user, &version, false)?;
        self.render(ConsentView::Confirmed, params)
    }

    /// Parse the identity and verify its signature.
    ///
    /// A parse failure is a malformed request (`Validation`), not missing
    /// credentials. A signature that fails to decode or to verify is
    /// rejected as `InvalidHmac` either way; the decode failure is never
    /// treated as a vacuous mismatch to be ignored.
    fn authenticate(&self, params: &ConsentParams) -> ConsentResult<UserId> {
        let user = UserId::parse(&params.user)?;
        match token::verify_user_hmac(&user, &params.hmac, &self.secret) {
            Ok(true) => Ok(user),
            Ok(false) | Err(_) => Err(ConsentError::InvalidHmac),
        }
    }

    fn render(&self, view: ConsentView, params: &ConsentParams) -> ConsentResult<ConsentResponse> {
        let data = ConsentTemplateData {
            user: &params.user,
            version: &params.version,
            user_hmac: &params.hmac,
            has_consented: view == ConsentView::Confirmed,
            public_version: view == ConsentView::Public,
        };
        let value = serde_json::to_value(&data)
            .map_err(|e| ConsentError::Render(format!("template context: {e}")))?;
        // one document per policy version: the template is named after the
        // server's current version
        let body = self.templater.render(self.current_version.as_str(), &value)?;
        Ok(ConsentResponse { view, body })
    }
}
