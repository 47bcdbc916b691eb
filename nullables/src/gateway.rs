//! Nullable role gateway — programmable privilege state for testing.

use async_trait::async_trait;
use rolegate_types::{GatewayError, GrantCheck, RoleGateway, UserId};
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    role_holders: HashSet<UserId>,
    pending: HashSet<UserId>,
    can_grant: Option<GrantCheck>,
    /// When false, `grant_role` reports success but the role set is left
    /// untouched, so the re-read contradicts the call result.
    grant_effective: bool,
    fail_grant: Option<String>,
    fail_has_role: Option<String>,
    grant_calls: u32,
}

/// A deterministic [`RoleGateway`] for testing.
///
/// Defaults: nobody holds the role, nobody is pending, grants are allowed
/// and take effect.
pub struct NullRoleGateway {
    inner: Mutex<Inner>,
}

impl NullRoleGateway {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                can_grant: Some(GrantCheck::Allowed),
                grant_effective: true,
                ..Inner::default()
            }),
        }
    }

    /// Mark a user as already holding the role.
    pub fn give_role(&self, user: UserId) {
        self.inner.lock().unwrap().role_holders.insert(user);
    }

    /// Mark a user as pending membership screening.
    pub fn set_pending(&self, user: UserId) {
        self.inner.lock().unwrap().pending.insert(user);
    }

    /// Make `can_grant` return the given denial.
    pub fn deny_grant(&self, check: GrantCheck) {
        self.inner.lock().unwrap().can_grant = Some(check);
    }

    /// Make `grant_role` report success without granting anything.
    pub fn make_grants_ineffective(&self) {
        self.inner.lock().unwrap().grant_effective = false;
    }

    /// Make `grant_role` fail with the given diagnostic.
    pub fn fail_grants(&self, diagnostic: &str) {
        self.inner.lock().unwrap().fail_grant = Some(diagnostic.to_string());
    }

    /// Make `has_role` fail with the given diagnostic.
    pub fn fail_role_reads(&self, diagnostic: &str) {
        self.inner.lock().unwrap().fail_has_role = Some(diagnostic.to_string());
    }

    /// Number of times `grant_role` was called.
    pub fn grant_calls(&self) -> u32 {
        self.inner.lock().unwrap().grant_calls
    }
}

impl Default for NullRoleGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoleGateway for NullRoleGateway {
    async fn has_role(&self, user: UserId) -> Result<bool, GatewayError> {
        let inner = self.inner.lock().unwrap();
        if let Some(diag) = &inner.fail_has_role {
            return Err(GatewayError::Transport(diag.clone()));
        }
        Ok(inner.role_holders.contains(&user))
    }

    async fn grant_role(&self, user: UserId) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        inner.grant_calls += 1;
        if let Some(diag) = &inner.fail_grant {
            return Err(GatewayError::Transport(diag.clone()));
        }
        if inner.grant_effective {
            inner.role_holders.insert(user);
        }
        Ok(())
    }

    async fn can_grant(&self) -> Result<GrantCheck, GatewayError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.can_grant.unwrap_or(GrantCheck::Allowed))
    }

    async fn is_pending(&self, user: UserId) -> Result<bool, GatewayError> {
        Ok(self.inner.lock().unwrap().pending.contains(&user))
    }
}
