//! Client configuration

use serde::{Deserialize, Serialize};

pub const ENV_BASE_URL: &str = "HOMEHUB_URL";
pub const ENV_SESSION: &str = "HOMEHUB_SESSION";

/// Connection settings for a `HubApi`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server root, e.g. `http://homehub.local:5000`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Raw `Cookie` header value sent with every request
    #[serde(default)]
    pub session_cookie: Option<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            session_cookie: None,
            user_agent: default_user_agent(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Defaults overridden by `HOMEHUB_URL` and `HOMEHUB_SESSION`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            config.base_url = url;
        }
        config.session_cookie = lookup(ENV_SESSION).filter(|v| !v.is_empty());
        config
    }

    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_user_agent() -> String {
    format!("homehub-core/{}", env!("CARGO_PKG_VERSION"))
}
