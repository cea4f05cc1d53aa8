use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub email: String,
}

/// Everything persisted about the signed-in user. The token pair is all-or-nothing:
/// see [`Credentials::is_partial`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl Credentials {
    pub fn empty() -> Self { Self::default() }

    pub fn is_empty(&self) -> bool { *self == Self::default() }

    /// Both halves of the token pair are present.
    pub fn has_token_pair(&self) -> bool { self.access_token.is_some() && self.refresh_token.is_some() }

    /// Exactly one half of the pair is present; never a valid signed-in state.
    pub fn is_partial(&self) -> bool { self.access_token.is_some() != self.refresh_token.is_some() }

    /// Replace only the token pair, keeping profile, roles and permissions.
    pub fn with_tokens(&self, access_token: String, refresh_token: String) -> Self {
        Self { access_token: Some(access_token), refresh_token: Some(refresh_token), ..self.clone() }
    }

    pub fn has_role(&self, role: &str) -> bool { self.roles.contains(role) }
    pub fn has_permission(&self, permission: &str) -> bool { self.permissions.contains(permission) }
}

fn redact(token: &Option<String>) -> &'static str {
    if token.is_some() { "<redacted>" } else { "<none>" }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("user", &self.user)
            .field("roles", &self.roles)
            .field("permissions", &self.permissions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_tokens() {
        let c = Credentials { access_token: Some("secret-a".into()), refresh_token: Some("secret-r".into()), ..Default::default() };
        let s = format!("{:?}", c);
        assert!(!s.contains("secret-a"));
        assert!(!s.contains("secret-r"));
        assert!(s.contains("<redacted>"));
    }

    #[test]
    fn partial_pair_detection() {
        let mut c = Credentials::empty();
        assert!(!c.is_partial());
        c.access_token = Some("a".into());
        assert!(c.is_partial());
        c.refresh_token = Some("r".into());
        assert!(!c.is_partial());
        assert!(c.has_token_pair());
    }

    #[test]
    fn with_tokens_keeps_profile() {
        let mut c = Credentials::empty().with_tokens("a1".into(), "r1".into());
        c.roles.insert("admin".into());
        let next = c.with_tokens("a2".into(), "r2".into());
        assert_eq!(next.access_token.as_deref(), Some("a2"));
        assert!(next.has_role("admin"));
    }

    #[test]
    fn persisted_keys_are_camel_case() {
        let c = Credentials::empty().with_tokens("a".into(), "r".into());
        let v = serde_json::to_value(&c).unwrap();
        assert!(v.get("accessToken").is_some());
        assert!(v.get("refreshToken").is_some());
        assert!(v.get("permissions").is_some());
    }
}
