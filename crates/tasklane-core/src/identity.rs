use tasklane_shared::UserId;

/// Source of the signed-in user. The store trusts whatever it returns.
pub trait IdentityProvider: Send + Sync {
    fn current_user_id(&self) -> Option<UserId>;
}

/// Identity fixed at construction, e.g. from `user.id` in the rc file.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user_id: Option<UserId>,
}

impl StaticIdentity {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { user_id: None }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user_id(&self) -> Option<UserId> {
        self.user_id.clone().filter(|id| !id.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_user_ids_count_as_signed_out() {
        assert_eq!(StaticIdentity::new("  ").current_user_id(), None);
        assert_eq!(StaticIdentity::anonymous().current_user_id(), None);
        assert_eq!(
            StaticIdentity::new("u-42").current_user_id().as_deref(),
            Some("u-42")
        );
    }
}
