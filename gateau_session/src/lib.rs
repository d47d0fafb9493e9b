/*!
Session management for HTTP middleware chains.

# Why do we need sessions?

The HTTP protocol, at a first glance, is stateless: the client sends a request,
the server parses its content, performs some processing and returns a response.
Sessions let the server attach state to a set of requests coming from the same
client, using cookies: the server sets a cookie in the HTTP response
(`Set-Cookie` header), the client stores it and sends it back on every
subsequent request (`Cookie` header).

# Anatomy of a session

A session is a bag of JSON key-value pairs with a creation timestamp.
It can live in one of two places:

- **cookie-backed** (the default): the whole state is encoded into the session
  cookie itself. No server-side storage is involved.
- **store-backed**: the state lives in an external store
  (implementing [`SessionStorageBackend`][store::SessionStorageBackend]) and
  the cookie only carries the session id.

Either way, the lifecycle is the same: [`SessionMiddleware`] loads the session
before your handlers run, handlers read and mutate it through
[`SessionHandle`], and the middleware commits it after they return. Nothing is
written back unless the state actually changed.

The session cookie is signed by default. See
[`SessionCookieConfig`][config::SessionCookieConfig] for the knobs.

## References

Further reading on sessions:
- [RFC 6265](https://datatracker.ietf.org/doc/html/rfc6265);
- [OWASP's session management cheat-sheet](https://cheatsheetseries.owasp.org/cheatsheets/Session_Management_Cheat_Sheet.html).
*/
pub mod config;

mod codec_;
mod id;
mod incoming;
mod middleware;
mod session_;
mod store_;
pub(crate) mod wire;

pub use codec_::{JsonBase64Codec, SessionCodec};
pub use id::{SessionId, SessionIdGenerator, TimestampIdGenerator};
pub use incoming::IncomingSession;
pub use middleware::{RequestSessionExt, SessionMiddleware, SessionMiddlewareBuilder};
pub use session_::{Session, SessionHandle};
pub use store_::{ContextStoreFactory, SessionStore};

pub mod store {
    //! Types and traits related to [`SessionStore`][super::SessionStore].
    pub use crate::store_::errors;
    pub use crate::store_::{SessionRecord, SessionRecordRef, SessionStorageBackend};
}

pub mod state {
    //! Types to manipulate the session state.
    pub use crate::session_::errors;
}

pub mod errors {
    //! Errors that can occur when setting up or running the middleware.
    pub use crate::codec_::errors::{DecodeError, EncodeError};
    pub use crate::id::errors::IdGenerationError;
    pub use crate::middleware::errors::{
        DuplicateMiddlewareError, ExtractRequestCookiesError, SessionError, SetupError,
    };
    pub use crate::session_::errors::{CommitError, InvalidAssignmentError};
}

pub mod cookie {
    //! Re-exports of the cookie primitives used at the middleware boundary.
    pub use biscotti::{
        Expiration, Key, Processor, ProcessorConfig, RemovalCookie, RequestCookie, RequestCookies,
        ResponseCookie, ResponseCookieId, ResponseCookies, SameSite, config,
    };
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
/// Configure how sessions are managed.
pub struct SessionConfig {
    #[serde(default)]
    /// Configure the session cookie.
    pub cookie: crate::config::SessionCookieConfig,
    #[serde(default = "default_auto_commit")]
    /// Whether the middleware commits the session on its own after the
    /// handlers return.
    ///
    /// When disabled, the application is responsible for calling
    /// [`SessionMiddleware::commit`] before the response goes out.
    ///
    /// Default is `true`.
    pub auto_commit: bool,
    #[serde(default)]
    /// A prefix prepended to every generated session id.
    ///
    /// Useful to namespace ids when several applications share a store.
    /// Only consulted by the default id generator; by default, no prefix.
    pub prefix: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie: Default::default(),
            auto_commit: default_auto_commit(),
            prefix: None,
        }
    }
}

fn default_auto_commit() -> bool {
    true
}
