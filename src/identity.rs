// ABOUTME: Caller identity capability injected into terminal sessions
// Supplies the optional user id announced to the relay in the connect frame

//! Operator identity sources.

/// Environment variable read by [`EnvIdentity::default`]
pub const USER_ID_ENV: &str = "INDIREX_USER_ID";

/// Source of the operator identity sent with `connect`.
pub trait IdentityProvider: Send + Sync {
    /// The operator's user id, if one is known
    fn user_id(&self) -> Option<String>;
}

/// Fixed identity, typically from configuration or the command line
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(Option<String>);

impl StaticIdentity {
    /// Identity that always reports `user_id`
    pub fn new(user_id: impl Into<String>) -> Self {
        Self(Some(user_id.into()))
    }

    /// Identity that never reports a user id
    pub const fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentityProvider for StaticIdentity {
    fn user_id(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Reads the identity from an environment variable each time it is asked
#[derive(Debug, Clone)]
pub struct EnvIdentity {
    var: String,
}

impl EnvIdentity {
    /// Read the identity from the variable `var`
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvIdentity {
    fn default() -> Self {
        Self::new(USER_ID_ENV)
    }
}

impl IdentityProvider for EnvIdentity {
    fn user_id(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}
