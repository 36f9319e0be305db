use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use accord_core::UserId;

use crate::error::{ServerError, ServerResult};

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8008
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// Configuration for the batch notice dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticeOptions {
    /// The identity notices are sent from; never noticed itself.
    #[serde(default = "default_notice_sender")]
    pub sender: String,

    /// Template name for the notice body.
    #[serde(default = "default_notice_template")]
    pub template: String,

    /// Message type stamped on outgoing notices.
    #[serde(default = "default_notice_msgtype")]
    pub msgtype: String,

    /// When set, `serve` also runs a dispatch pass on this interval.
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

fn default_notice_sender() -> String {
    "@notices:localhost".to_string()
}

fn default_notice_template() -> String {
    "server_notice".to_string()
}

fn default_notice_msgtype() -> String {
    "m.text".to_string()
}

impl Default for NoticeOptions {
    fn default() -> Self {
        Self {
            sender: default_notice_sender(),
            template: default_notice_template(),
            msgtype: default_notice_msgtype(),
            interval_secs: None,
        }
    }
}

/// Consent-flow configuration: the current policy version, the link
/// secret, and where links point back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentOptions {
    /// The current policy version users must accept. Also the name of the
    /// policy template.
    #[serde(default = "default_policy_version")]
    pub version: String,

    /// Secret the link signatures are keyed with. Must be set.
    #[serde(default)]
    pub form_secret: String,

    /// Base URL consent links are rendered against.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Directory the policy and notice templates are loaded from.
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,

    #[serde(default)]
    pub notices: NoticeOptions,
}

fn default_policy_version() -> String {
    "1.0".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8008".to_string()
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("templates")
}

impl Default for ConsentOptions {
    fn default() -> Self {
        Self {
            version: default_policy_version(),
            form_secret: String::new(),
            base_url: default_base_url(),
            template_dir: default_template_dir(),
            notices: NoticeOptions::default(),
        }
    }
}

/// Top-level configuration for the Accord binary.
///
/// Loaded from a TOML file (by default `accord.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccordConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub consent: ConsentOptions,

    /// Path to the SQLite consent store.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Path to the outbox spool consumed by the delivery agent.
    #[serde(default = "default_outbox_path")]
    pub outbox_path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("consent.db")
}

fn default_outbox_path() -> PathBuf {
    PathBuf::from("outbox.jsonl")
}

impl Default for AccordConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            consent: ConsentOptions::default(),
            store_path: default_store_path(),
            outbox_path: default_outbox_path(),
        }
    }
}

impl AccordConfig {
    /// Load configuration from a TOML file. If the file does not exist,
    /// returns a default configuration (which will fail validation until
    /// a form secret is set).
    pub fn load(path: &Path) -> ServerResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(ServerError::Io)?;
        let config: AccordConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Write the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> ServerResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ServerError::Config(format!("TOML serialize error: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ServerError::Io)?;
        }
        std::fs::write(path, contents).map_err(ServerError::Io)?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> ServerResult<()> {
        if self.consent.version.is_empty() {
            return Err(ServerError::Config("consent.version must be set".into()));
        }
        if self.consent.form_secret.is_empty() {
            return Err(ServerError::Config("consent.form_secret must be set".into()));
        }
        if !self.consent.base_url.starts_with("http://")
            && !self.consent.base_url.starts_with("https://")
        {
            return Err(ServerError::Config(format!(
                "consent.base_url must be an http(s) URL, got '{}'",
                self.consent.base_url
            )));
        }
        UserId::parse(&self.consent.notices.sender).map_err(|e| {
            ServerError::Config(format!("consent.notices.sender is not a valid user id: {e}"))
        })?;
        if self.consent.notices.interval_secs == Some(0) {
            return Err(ServerError::Config(
                "consent.notices.interval_secs must be > 0 when set".into(),
            ));
        }
        Ok(())
    }

    /// The configured notice sender as a parsed identity.
    pub fn notice_sender(&self) -> ServerResult<UserId> {
        UserId::parse(&self.consent.notices.sender).map_err(ServerError::Consent)
    }
}
