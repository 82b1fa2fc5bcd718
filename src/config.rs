use std::{env, net::SocketAddr, path::PathBuf};

use crate::models::Identity;

/// Connection settings for the remote document store.
///
/// The remote counts as configured only when all three values are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteConfig {
    pub api_key: Option<String>,
    pub auth_domain: Option<String>,
    pub project_id: Option<String>,
}

impl RemoteConfig {
    pub fn new(api_key: &str, auth_domain: &str, project_id: &str) -> Self {
        Self {
            api_key: Some(api_key.to_string()),
            auth_domain: Some(auth_domain.to_string()),
            project_id: Some(project_id.to_string()),
        }
    }

    /// - `COUNTDOWN_REMOTE_API_KEY`
    /// - `COUNTDOWN_REMOTE_AUTH_DOMAIN`
    /// - `COUNTDOWN_REMOTE_PROJECT_ID`
    pub fn from_env() -> Self {
        Self {
            api_key: non_empty_var("COUNTDOWN_REMOTE_API_KEY"),
            auth_domain: non_empty_var("COUNTDOWN_REMOTE_AUTH_DOMAIN"),
            project_id: non_empty_var("COUNTDOWN_REMOTE_PROJECT_ID"),
        }
    }

    pub fn is_complete(&self) -> bool {
        [&self.api_key, &self.auth_domain, &self.project_id]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory for the local JSON store.
    pub data_dir: PathBuf,
    /// Address of the HTTP listener.
    pub bind_addr: SocketAddr,
    /// Directory served as static files.
    pub static_dir: PathBuf,
    pub remote: RemoteConfig,
    /// Identity handed out by the bundled sign-in provider.
    pub dev_identity: Option<Identity>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// - `COUNTDOWN_DATA_DIR` (optional, default `data`)
    /// - `COUNTDOWN_BIND_ADDR` (optional, default `127.0.0.1:3000`)
    /// - `COUNTDOWN_STATIC_DIR` (optional, default `static`)
    /// - `COUNTDOWN_DEV_UID`, `COUNTDOWN_DEV_NAME`, `COUNTDOWN_DEV_EMAIL` (optional)
    pub fn from_env() -> Self {
        let data_dir = non_empty_var("COUNTDOWN_DATA_DIR").unwrap_or_else(|| "data".to_string());

        let bind_addr = non_empty_var("COUNTDOWN_BIND_ADDR")
            .and_then(|s| s.parse::<SocketAddr>().ok())
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3000)));

        let static_dir =
            non_empty_var("COUNTDOWN_STATIC_DIR").unwrap_or_else(|| "static".to_string());

        let dev_identity = non_empty_var("COUNTDOWN_DEV_UID").map(|uid| Identity {
            uid,
            display_name: non_empty_var("COUNTDOWN_DEV_NAME"),
            email: non_empty_var("COUNTDOWN_DEV_EMAIL"),
        });

        Self {
            data_dir: PathBuf::from(data_dir),
            bind_addr,
            static_dir: PathBuf::from(static_dir),
            remote: RemoteConfig::from_env(),
            dev_identity,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_needs_every_field() {
        assert!(!RemoteConfig::default().is_complete());
        assert!(RemoteConfig::new("key", "example.test", "demo").is_complete());

        let mut partial = RemoteConfig::new("key", "example.test", "demo");
        partial.project_id = Some("  ".into());
        assert!(!partial.is_complete());
    }
}
