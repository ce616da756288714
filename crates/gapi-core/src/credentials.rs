use std::fmt;

use crate::config::EnvSnapshot;

/// Basic-auth pair for a remote repository.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Returns `None` unless both halves are non-blank.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Option<Self> {
        let username = username.into();
        let password = password.into();
        if username.trim().is_empty() || password.trim().is_empty() {
            return None;
        }
        Some(Self { username, password })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub trait CredentialSource {
    fn name(&self) -> &str;
    fn credentials(&self) -> Option<Credentials>;
}

pub struct ExplicitCredentials {
    username: Option<String>,
    password: Option<String>,
}

impl ExplicitCredentials {
    #[must_use]
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self { username, password }
    }
}

impl CredentialSource for ExplicitCredentials {
    fn name(&self) -> &str {
        "explicit"
    }

    fn credentials(&self) -> Option<Credentials> {
        Credentials::new(self.username.clone()?, self.password.clone()?)
    }
}

/// Reads a username/password pair from two named environment variables.
pub struct EnvCredentials<'a> {
    snapshot: &'a EnvSnapshot,
    username_key: &'a str,
    password_key: &'a str,
}

impl<'a> EnvCredentials<'a> {
    #[must_use]
    pub fn new(snapshot: &'a EnvSnapshot, username_key: &'a str, password_key: &'a str) -> Self {
        Self {
            snapshot,
            username_key,
            password_key,
        }
    }
}

impl CredentialSource for EnvCredentials<'_> {
    fn name(&self) -> &str {
        self.username_key
    }

    fn credentials(&self) -> Option<Credentials> {
        Credentials::new(
            self.snapshot.var(self.username_key)?,
            self.snapshot.var(self.password_key)?,
        )
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    pub credentials: Credentials,
    pub source: String,
}

/// Ordered credential sources; the first one that yields a pair wins and
/// later ones are never consulted.
#[derive(Default)]
pub struct CredentialChain<'a> {
    sources: Vec<Box<dyn CredentialSource + 'a>>,
}

impl<'a> CredentialChain<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, source: impl CredentialSource + 'a) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    #[must_use]
    pub fn resolve(&self) -> Option<ResolvedCredentials> {
        self.sources.iter().find_map(|source| {
            source.credentials().map(|credentials| ResolvedCredentials {
                credentials,
                source: source.name().to_string(),
            })
        })
    }
}
