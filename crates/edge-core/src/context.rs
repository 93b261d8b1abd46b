//! Principals and request identifiers.

use serde::{Deserialize, Serialize};

/// Role implicitly held by every anonymous principal.
pub const ANONYMOUS_ROLE: &str = "anonymous";

/// Role implicitly held by every authenticated principal.
pub const AUTHENTICATED_ROLE: &str = "authenticated";

/// Unique request identifier for tracing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new request ID.
    pub fn generate() -> Self {
        use rand::Rng;

        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let mut rng = rand::thread_rng();
        Self(format!("{:x}-{:08x}-{:08x}", nanos, rng.gen::<u32>(), rng.gen::<u32>()))
    }

    /// Create from an existing ID string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The party a request acts for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Principal {
    /// Visitor without an account, tracked by session only.
    Anonymous {
        /// Session identifier.
        session_id: String,
    },
    /// Logged-in user.
    Authenticated {
        /// User identifier.
        user_id: String,
        /// Session identifier.
        session_id: String,
        /// Explicitly granted role identifiers.
        roles: Vec<String>,
    },
}

impl Principal {
    /// Create an anonymous principal.
    pub fn anonymous(session_id: impl Into<String>) -> Self {
        Self::Anonymous {
            session_id: session_id.into(),
        }
    }

    /// Create an authenticated principal.
    pub fn authenticated<I, S>(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        roles: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Authenticated {
            user_id: user_id.into(),
            session_id: session_id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if the principal is authenticated.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    /// Session identifier.
    pub fn session_id(&self) -> &str {
        match self {
            Self::Anonymous { session_id } | Self::Authenticated { session_id, .. } => session_id,
        }
    }

    /// User identifier, if authenticated.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Authenticated { user_id, .. } => Some(user_id),
            Self::Anonymous { .. } => None,
        }
    }

    /// Effective roles: sorted, deduplicated, including the implicit role.
    pub fn roles(&self) -> Vec<String> {
        let mut roles = match self {
            Self::Anonymous { .. } => vec![ANONYMOUS_ROLE.to_string()],
            Self::Authenticated { roles, .. } => {
                let mut roles = roles.clone();
                roles.push(AUTHENTICATED_ROLE.to_string());
                roles
            }
        };
        roles.sort();
        roles.dedup();
        roles
    }
}
