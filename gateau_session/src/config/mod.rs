//! Types related to [`SessionConfig`][crate::SessionConfig].
mod cookie;

pub use cookie::SessionCookieConfig;

use crate::codec_::{JsonBase64Codec, SessionCodec};
use crate::id::{SessionIdGenerator, TimestampIdGenerator};
use std::sync::Arc;

#[derive(Debug, Clone)]
/// The pluggable strategies a session relies on: payload codec and id
/// generation.
///
/// Unlike [`SessionConfig`][crate::SessionConfig], hooks are code, not data:
/// they are installed programmatically via
/// [`SessionMiddlewareBuilder`][crate::SessionMiddlewareBuilder] rather than
/// deserialized from configuration.
pub struct SessionHooks {
    /// Converts session state to and from the cookie payload.
    pub codec: Arc<dyn SessionCodec>,
    /// Mints identifiers for new store-backed sessions.
    pub id_generator: Arc<dyn SessionIdGenerator>,
}

impl Default for SessionHooks {
    fn default() -> Self {
        Self {
            codec: Arc::new(JsonBase64Codec),
            id_generator: Arc::new(TimestampIdGenerator::default()),
        }
    }
}
