//! Access token checks for websocket clients

use std::collections::HashSet;

use lcn_config::ApiConfig;

/// What an authenticated connection may do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Admin,
    ReadOnly,
}

impl Access {
    pub fn is_admin(self) -> bool {
        self == Access::Admin
    }
}

/// Token lists from the `api:` section.
///
/// With no tokens configured at all, any non-empty token is accepted with
/// admin rights.
#[derive(Debug, Clone, Default)]
pub struct AuthPolicy {
    admin_tokens: HashSet<String>,
    read_only_tokens: HashSet<String>,
}

impl AuthPolicy {
    pub fn new(
        admin_tokens: impl IntoIterator<Item = String>,
        read_only_tokens: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            admin_tokens: admin_tokens.into_iter().collect(),
            read_only_tokens: read_only_tokens.into_iter().collect(),
        }
    }

    pub fn from_config(config: &ApiConfig) -> Self {
        Self::new(
            config.access_tokens.iter().cloned(),
            config.read_only_tokens.iter().cloned(),
        )
    }

    /// Accept every non-empty token
    pub fn open() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.admin_tokens.is_empty() && self.read_only_tokens.is_empty()
    }

    pub fn authenticate(&self, token: &str) -> Option<Access> {
        if token.is_empty() {
            return None;
        }
        if self.is_open() || self.admin_tokens.contains(token) {
            Some(Access::Admin)
        } else if self.read_only_tokens.contains(token) {
            Some(Access::ReadOnly)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_policy() {
        let policy = AuthPolicy::open();
        assert_eq!(policy.authenticate("anything"), Some(Access::Admin));
        assert_eq!(policy.authenticate(""), None);
    }

    #[test]
    fn test_token_lists() {
        let policy = AuthPolicy::new(["admin".to_string()], ["viewer".to_string()]);
        assert!(!policy.is_open());
        assert_eq!(policy.authenticate("admin"), Some(Access::Admin));
        assert_eq!(policy.authenticate("viewer"), Some(Access::ReadOnly));
        assert_eq!(policy.authenticate("guess"), None);
    }
}
