use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Paths of the remote auth endpoints, relative to `base_url`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Endpoints {
    pub login: String,
    pub refresh: String,
    pub logout: String,
    pub register: String,
    pub profile: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/auth/login".into(),
            refresh: "/auth/refresh".into(),
            logout: "/auth/logout".into(),
            register: "/auth/register".into(),
            profile: "/user/profile".into(),
        }
    }
}

impl Endpoints {
    /// Endpoints that must never carry a bearer header or trigger a refresh.
    pub fn is_unauthenticated(&self, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or(path);
        [&self.login, &self.register, &self.refresh].iter().any(|p| path.ends_with(p.as_str()))
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Upper bound for any single remote call, refresh included.
    pub request_timeout_secs: u64,
    /// Tokens expiring within this window are refreshed proactively.
    pub expiry_skew_secs: u64,
    pub credentials_path: PathBuf,
    pub endpoints: Endpoints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5046/api".into(),
            request_timeout_secs: 30,
            expiry_skew_secs: crate::identity::DEFAULT_SKEW_SECS,
            credentials_path: PathBuf::from("sessionguard").join("credentials.json"),
            endpoints: Endpoints::default(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs) }
    pub fn expiry_skew(&self) -> Duration {
        Duration::from_secs(self.expiry_skew_secs.min(crate::identity::MAX_SKEW_SECS))
    }

    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading config {}", path.display()))?;
        let cfg: ClientConfig = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Override fields from `SESSIONGUARD_*` environment variables.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("SESSIONGUARD_BASE_URL") { self.base_url = v; }
        if let Ok(v) = std::env::var("SESSIONGUARD_TIMEOUT_SECS") {
            self.request_timeout_secs = v.trim().parse().context("SESSIONGUARD_TIMEOUT_SECS must be an integer")?;
        }
        if let Ok(v) = std::env::var("SESSIONGUARD_SKEW_SECS") {
            let secs: u64 = v.trim().parse().context("SESSIONGUARD_SKEW_SECS must be an integer")?;
            anyhow::ensure!(secs <= crate::identity::MAX_SKEW_SECS, "SESSIONGUARD_SKEW_SECS must be at most {}", crate::identity::MAX_SKEW_SECS);
            self.expiry_skew_secs = secs;
        }
        if let Ok(v) = std::env::var("SESSIONGUARD_CREDENTIALS_PATH") { self.credentials_path = PathBuf::from(v); }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_auth_contract() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.expiry_skew(), Duration::from_secs(60));
        assert_eq!(cfg.endpoints.refresh, "/auth/refresh");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("client.json");
        std::fs::write(&p, br#"{"base_url":"https://api.example.test","endpoints":{"refresh":"/auth/refresh-token"}}"#).unwrap();
        let cfg = ClientConfig::from_file(&p).unwrap();
        assert_eq!(cfg.base_url, "https://api.example.test");
        assert_eq!(cfg.endpoints.refresh, "/auth/refresh-token");
        assert_eq!(cfg.endpoints.login, "/auth/login");
        assert_eq!(cfg.expiry_skew_secs, 60);
    }

    #[test]
    fn env_overrides_apply() {
        std::env::set_var("SESSIONGUARD_SKEW_SECS", "15");
        std::env::set_var("SESSIONGUARD_BASE_URL", "https://auth.example.test/api");
        let cfg = ClientConfig::from_env().unwrap();
        std::env::remove_var("SESSIONGUARD_SKEW_SECS");
        std::env::remove_var("SESSIONGUARD_BASE_URL");
        assert_eq!(cfg.expiry_skew(), Duration::from_secs(15));
        assert_eq!(cfg.base_url, "https://auth.example.test/api");
        assert_eq!(cfg.request_timeout_secs, 30);

        std::env::set_var("SESSIONGUARD_SKEW_SECS", "9000000000000");
        let rejected = ClientConfig::from_env();
        std::env::remove_var("SESSIONGUARD_SKEW_SECS");
        assert!(rejected.is_err());
    }

    #[test]
    fn oversized_skew_in_file_is_capped() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("client.json");
        std::fs::write(&p, br#"{"expiry_skew_secs":9000000000000}"#).unwrap();
        let cfg = ClientConfig::from_file(&p).unwrap();
        assert_eq!(cfg.expiry_skew(), Duration::from_secs(crate::identity::MAX_SKEW_SECS));
    }

    #[test]
    fn auth_endpoints_are_recognised() {
        let ep = Endpoints::default();
        assert!(ep.is_unauthenticated("/auth/login"));
        assert!(ep.is_unauthenticated("/api/auth/refresh?x=1"));
        assert!(ep.is_unauthenticated("/auth/register"));
        assert!(!ep.is_unauthenticated("/auth/logout"));
        assert!(!ep.is_unauthenticated("/events"));
    }
}
