use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use errors::IdGenerationError;
use jiff::Timestamp;
use ring::rand::{SecureRandom, SystemRandom};

#[derive(
    Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
/// The identifier used to key a session in an external store.
///
/// # Format stability
///
/// From an API perspective, a session id is an opaque string.
/// Do **not** depend on the specifics of the underlying representation.
/// It may change between versions and those changes will not be considered
/// breaking changes.
pub struct SessionId(String);

impl SessionId {
    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The strategy used to mint identifiers for new sessions.
///
/// A custom generator can be installed via
/// [`SessionMiddlewareBuilder::id_generator`][crate::SessionMiddlewareBuilder::id_generator].
pub trait SessionIdGenerator: std::fmt::Debug + Send + Sync {
    /// Generate a fresh session identifier.
    ///
    /// Identifiers must be unique across live sessions: a collision silently
    /// overwrites the other session's record in the store.
    fn generate(&self) -> Result<SessionId, IdGenerationError>;
}

#[derive(Debug, Clone)]
/// The default [`SessionIdGenerator`].
///
/// It produces identifiers of the form `<prefix><unix-millis>-<token>`, where
/// `token` is 24 random bytes sourced from the operating system, encoded as
/// URL-safe base64.
pub struct TimestampIdGenerator {
    prefix: Option<String>,
    rng: SystemRandom,
}

impl TimestampIdGenerator {
    /// Create a new generator.
    ///
    /// If `prefix` is `Some`, it is prepended verbatim to every generated id.
    pub fn new(prefix: Option<String>) -> Self {
        Self {
            prefix,
            rng: SystemRandom::new(),
        }
    }
}

impl Default for TimestampIdGenerator {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SessionIdGenerator for TimestampIdGenerator {
    fn generate(&self) -> Result<SessionId, IdGenerationError> {
        let mut token = [0u8; 24];
        self.rng
            .fill(&mut token)
            .map_err(IdGenerationError::RandomSource)?;
        let millis = Timestamp::now().as_millisecond();
        let prefix = self.prefix.as_deref().unwrap_or("");
        Ok(SessionId(format!(
            "{prefix}{millis}-{}",
            URL_SAFE_NO_PAD.encode(token)
        )))
    }
}

/// Errors that can occur when generating session identifiers.
pub mod errors {
    #[non_exhaustive]
    #[derive(Debug, thiserror::Error)]
    /// The error returned by [`SessionIdGenerator::generate`][super::SessionIdGenerator::generate].
    pub enum IdGenerationError {
        /// The operating system's random number generator failed to produce a token.
        #[error("Failed to source enough randomness for a new session id.")]
        RandomSource(#[source] ring::error::Unspecified),
        /// Something else went wrong when generating a new session id.
        #[error("Something went wrong when generating a new session id.")]
        Other(#[source] anyhow::Error),
    }
}
