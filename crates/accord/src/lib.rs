//! Accord: policy-consent service.
//!
//! Users prove their identity by following a signed link — no session
//! required. The server renders the policy, records explicit acceptances,
//! and a batch dispatcher chases users whose recorded state is behind the
//! current policy version.
//!
//! # Architecture
//!
//! The binary is a thin orchestrator. The request state machine
//! ([`handler::ConsentRequestHandler`]) and the batch dispatcher
//! (`accord_notify::NoticeDispatcher`) only see the collaborator traits
//! from `accord-core`; this crate wires in the concrete SQLite store,
//! the directory templater, and the outbox spool sender.

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod outbox;
pub mod templater;

pub use config::AccordConfig;
pub use error::{ServerError, ServerResult};

use std::sync::Arc;

use accord_core::{ConsentStateStore, FormSecret, PolicyVersion, Templater};
use accord_notify::{NoticeConfig, NoticeDispatcher};
use accord_store::SqliteConsentStore;

use crate::handler::ConsentRequestHandler;
use crate::outbox::OutboxSender;
use crate::templater::DirTemplater;

/// Open the configured SQLite consent store.
pub fn open_store(config: &AccordConfig) -> ServerResult<Arc<SqliteConsentStore>> {
    let path = config
        .store_path
        .to_str()
        .ok_or_else(|| ServerError::Config("store_path is not valid UTF-8".into()))?;
    Ok(Arc::new(SqliteConsentStore::open(path)?))
}

/// Load the configured template directory.
pub fn load_templates(config: &AccordConfig) -> ServerResult<Arc<DirTemplater>> {
    Ok(Arc::new(DirTemplater::from_dir(&config.consent.template_dir)?))
}

/// Wire the request handler from configuration and collaborators.
pub fn build_handler(
    config: &AccordConfig,
    store: Arc<dyn ConsentStateStore>,
    templater: Arc<dyn Templater>,
) -> ConsentRequestHandler {
    ConsentRequestHandler::new(
        store,
        templater,
        FormSecret::new(&config.consent.form_secret),
        PolicyVersion::new(config.consent.version.clone()),
    )
}

/// Wire the notice dispatcher from configuration and collaborators,
/// delivering through the outbox spool.
pub fn build_dispatcher(
    config: &AccordConfig,
    store: Arc<dyn ConsentStateStore>,
    templater: Arc<dyn Templater>,
) -> ServerResult<NoticeDispatcher> {
    let notice_config = NoticeConfig {
        current_version: PolicyVersion::new(config.consent.version.clone()),
        base_url: config.consent.base_url.clone(),
        secret: FormSecret::new(&config.consent.form_secret),
        sender: config.notice_sender()?,
        template: config.consent.notices.template.clone(),
        msgtype: config.consent.notices.msgtype.clone(),
    };
    let sender = Arc::new(OutboxSender::new(config.outbox_path.clone()));
    Ok(NoticeDispatcher::new(store, sender, templater, notice_config))
}
