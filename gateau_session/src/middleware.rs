use crate::codec_::SessionCodec;
use crate::config::SessionHooks;
use crate::id::SessionIdGenerator;
use crate::incoming::extract_request_cookies;
use crate::session_::{Session, SessionHandle};
use crate::store_::{ContextStoreFactory, SessionStore, StoreBinding};
use crate::{IncomingSession, SessionConfig};
use biscotti::config::{CryptoAlgorithm, CryptoRule};
use biscotti::{Key, Processor, ProcessorConfig, ResponseCookie, ResponseCookies};
use errors::{DuplicateMiddlewareError, SessionError, SetupError};
use http::header::SET_COOKIE;
use http::{HeaderValue, Request, Response};
use std::future::Future;
use std::sync::Arc;
use tracing_log_error::log_error;

/// The session middleware: loads the session before your handlers run and
/// commits it after they return.
///
/// Built via [`SessionMiddleware::builder`]. It is framework-agnostic: wire
/// [`SessionMiddleware::wrap`] into whatever middleware chain your HTTP stack
/// provides.
#[derive(Clone)]
pub struct SessionMiddleware {
    config: Arc<SessionConfig>,
    hooks: SessionHooks,
    processor: Arc<Processor>,
    binding: StoreBinding,
}

impl std::fmt::Debug for SessionMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The processor holds the signing key, keep it out of the output.
        f.debug_struct("SessionMiddleware")
            .field("config", &self.config)
            .field("binding", &self.binding)
            .finish_non_exhaustive()
    }
}

impl SessionMiddleware {
    /// Start configuring the middleware.
    pub fn builder(config: SessionConfig) -> SessionMiddlewareBuilder {
        SessionMiddlewareBuilder {
            config,
            store: None,
            context_store: None,
            signing_key: None,
            codec: None,
            id_generator: None,
        }
    }

    /// The configuration the middleware operates under.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The cookie processor, with the signing rule (if any) for the session
    /// cookie already in place.
    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    /// Process a request with a session attached.
    ///
    /// The session is loaded from the request cookies (and, for store-backed
    /// sessions, from the store), attached to the request extensions, and
    /// committed after `next` returns, whether it succeeded or not:
    ///
    /// - if `next` succeeds, a commit failure takes its place as the outcome;
    /// - if `next` fails, its error is returned unchanged and a commit failure
    ///   is only logged. A store-backed session created during the failing
    ///   request is not persisted at all: the error response carries no
    ///   cookie, so the record would be unreachable.
    ///
    /// With [`auto_commit`][SessionConfig::auto_commit] disabled the commit
    /// step is skipped entirely; call [`SessionMiddleware::commit`] yourself.
    pub async fn wrap<B, ResBody, F, Fut, E>(
        &self,
        mut request: Request<B>,
        next: F,
    ) -> Result<Response<ResBody>, E>
    where
        F: FnOnce(Request<B>) -> Fut,
        Fut: Future<Output = Result<Response<ResBody>, E>>,
        E: From<SessionError>,
    {
        if request.extensions().get::<SessionHandle>().is_some() {
            return Err(E::from(DuplicateMiddlewareError.into()));
        }

        let store = self.binding.bind(request.extensions());
        let incoming = match extract_request_cookies(request.headers(), &self.processor) {
            Ok(cookies) => {
                IncomingSession::extract(&cookies, &self.config, &*self.hooks.codec, store.is_some())
            }
            Err(e) => {
                log_error!(
                    e,
                    level: tracing::Level::WARN,
                    "Failed to parse request cookies, starting a fresh session"
                );
                None
            }
        };

        let mut session = Session::new(&self.config, &self.hooks, store.as_ref(), incoming);
        if session.external_key().is_some() {
            session
                .init_from_external()
                .await
                .map_err(|e| E::from(SessionError::from(e)))?;
        }
        let handle = SessionHandle::new(session);
        request.extensions_mut().insert(handle.clone());

        let outcome = next(request).await;

        if !self.config.auto_commit {
            return outcome;
        }
        match outcome {
            Ok(mut response) => {
                self.commit(&handle, &mut response)
                    .await
                    .map_err(|e| E::from(SessionError::from(e)))?;
                Ok(response)
            }
            Err(handler_error) => {
                // The handler error wins. Still commit: state written before
                // the failure is state the application chose to keep. The one
                // exception is a store-backed session minted during this very
                // request: the error response carries no cookie, so the client
                // could never reach the record.
                let mut session = handle.lock().await;
                if store.is_none() || session.external_key().is_some() {
                    if let Err(e) = session.commit().await {
                        log_error!(
                            e,
                            level: tracing::Level::WARN,
                            "Failed to commit the session after a handler error"
                        );
                    }
                }
                Err(handler_error)
            }
        }
    }

    /// Commit the session and attach the resulting `Set-Cookie` header (if
    /// any) to the response.
    ///
    /// With [`auto_commit`][SessionConfig::auto_commit] enabled this is done
    /// for you by [`SessionMiddleware::wrap`]; call it yourself otherwise.
    pub async fn commit<ResBody>(
        &self,
        handle: &SessionHandle,
        response: &mut Response<ResBody>,
    ) -> Result<(), crate::state::errors::CommitError> {
        let cookie = handle.lock().await.commit().await?;
        match cookie {
            Some(cookie) => self.attach_cookie(cookie, response),
            None => Ok(()),
        }
    }

    fn attach_cookie<ResBody>(
        &self,
        cookie: ResponseCookie<'static>,
        response: &mut Response<ResBody>,
    ) -> Result<(), crate::state::errors::CommitError> {
        use crate::state::errors::CommitError;

        let name = self.config.cookie.name.as_str();
        let existing: Vec<HeaderValue> = response
            .headers()
            .get_all(SET_COOKIE)
            .into_iter()
            .cloned()
            .collect();
        let has_same_name = existing
            .iter()
            .any(|header| cookie_header_name(header) == Some(name));
        if has_same_name {
            if !self.config.cookie.overwrite {
                return Ok(());
            }
            response.headers_mut().remove(SET_COOKIE);
            for header in existing {
                if cookie_header_name(&header) != Some(name) {
                    response.headers_mut().append(SET_COOKIE, header);
                }
            }
        }

        let mut response_cookies = ResponseCookies::new();
        response_cookies.insert(cookie);
        for value in response_cookies.header_values(&self.processor) {
            let value = HeaderValue::from_str(&value).map_err(|_| {
                CommitError::InvalidHeaderValue {
                    invalid_header_value: value,
                }
            })?;
            response.headers_mut().append(SET_COOKIE, value);
        }
        Ok(())
    }
}

/// The cookie name at the front of a `Set-Cookie` header value.
fn cookie_header_name(header: &HeaderValue) -> Option<&str> {
    header.to_str().ok()?.split('=').next().map(str::trim)
}

/// Configures and validates a [`SessionMiddleware`].
///
/// Misconfigurations are caught here, once, at application startup, rather
/// than on every request.
pub struct SessionMiddlewareBuilder {
    config: SessionConfig,
    store: Option<SessionStore>,
    context_store: Option<Arc<dyn ContextStoreFactory>>,
    signing_key: Option<Key>,
    codec: Option<Arc<dyn SessionCodec>>,
    id_generator: Option<Arc<dyn SessionIdGenerator>>,
}

impl SessionMiddlewareBuilder {
    /// Use a store shared across all requests.
    ///
    /// Sessions become store-backed: only the session id travels in the
    /// cookie. Mutually exclusive with
    /// [`context_store`][SessionMiddlewareBuilder::context_store].
    pub fn store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Build a fresh store for each request.
    ///
    /// Sessions become store-backed: only the session id travels in the
    /// cookie. Mutually exclusive with
    /// [`store`][SessionMiddlewareBuilder::store].
    pub fn context_store<F>(mut self, factory: F) -> Self
    where
        F: ContextStoreFactory + 'static,
    {
        self.context_store = Some(Arc::new(factory));
        self
    }

    /// The key used to sign the session cookie.
    ///
    /// Required when the cookie is configured to be signed (the default).
    pub fn signing_key(mut self, key: Key) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Install a custom payload codec, replacing [`JsonBase64Codec`][crate::JsonBase64Codec].
    pub fn codec<C>(mut self, codec: C) -> Self
    where
        C: SessionCodec + 'static,
    {
        self.codec = Some(Arc::new(codec));
        self
    }

    /// Install a custom id generator, replacing
    /// [`TimestampIdGenerator`][crate::TimestampIdGenerator].
    ///
    /// The default generator honours the configured
    /// [`prefix`][SessionConfig::prefix]; a custom one is on its own.
    pub fn id_generator<G>(mut self, id_generator: G) -> Self
    where
        G: SessionIdGenerator + 'static,
    {
        self.id_generator = Some(Arc::new(id_generator));
        self
    }

    /// Validate the configuration and build the middleware.
    pub fn build(self) -> Result<SessionMiddleware, SetupError> {
        let binding = match (self.store, self.context_store) {
            (Some(_), Some(_)) => return Err(SetupError::BothStoresConfigured),
            (Some(store), None) => StoreBinding::Shared(store),
            (None, Some(factory)) => StoreBinding::PerRequest(factory),
            (None, None) => StoreBinding::None,
        };

        let mut processor_config = ProcessorConfig::default();
        if self.config.cookie.signed {
            let Some(key) = self.signing_key else {
                return Err(SetupError::MissingSigningKey);
            };
            processor_config.crypto_rules.push(CryptoRule {
                cookie_names: vec![self.config.cookie.name.clone()],
                algorithm: CryptoAlgorithm::Signing,
                key,
                fallbacks: vec![],
            });
        }

        let mut hooks = SessionHooks::default();
        if let Some(prefix) = &self.config.prefix {
            hooks.id_generator = Arc::new(crate::id::TimestampIdGenerator::new(Some(
                prefix.clone(),
            )));
        }
        if let Some(codec) = self.codec {
            hooks.codec = codec;
        }
        if let Some(id_generator) = self.id_generator {
            hooks.id_generator = id_generator;
        }

        Ok(SessionMiddleware {
            config: Arc::new(self.config),
            hooks,
            processor: Arc::new(processor_config.into()),
            binding,
        })
    }
}

/// Request-side access to the session attached by [`SessionMiddleware`].
pub trait RequestSessionExt {
    /// The handle to the session attached to this request, if any.
    fn session(&self) -> Option<SessionHandle>;
}

impl<B> RequestSessionExt for Request<B> {
    fn session(&self) -> Option<SessionHandle> {
        self.extensions().get::<SessionHandle>().cloned()
    }
}

/// Errors that can occur when setting up or running the middleware.
pub mod errors {
    pub use crate::incoming::ExtractRequestCookiesError;

    #[non_exhaustive]
    #[derive(Debug, thiserror::Error)]
    /// The error returned by [`SessionMiddlewareBuilder::build`][super::SessionMiddlewareBuilder::build].
    pub enum SetupError {
        /// Both a shared store and a per-request store factory were configured.
        #[error(
            "Both a shared session store and a per-request store factory were configured. Configure exactly one of the two."
        )]
        BothStoresConfigured,
        /// The cookie is configured to be signed, but no signing key was provided.
        #[error(
            "The session cookie is configured to be signed, but no signing key was provided. Provide one via `SessionMiddlewareBuilder::signing_key`, or disable signing explicitly."
        )]
        MissingSigningKey,
    }

    #[derive(Debug, Clone, Copy, thiserror::Error)]
    #[error(
        "A session has already been attached to this request. The session middleware must run at most once per request."
    )]
    /// A session was already attached to the request when the middleware ran.
    pub struct DuplicateMiddlewareError;

    #[non_exhaustive]
    #[derive(Debug, thiserror::Error)]
    /// The error returned by [`SessionMiddleware::wrap`][super::SessionMiddleware::wrap].
    pub enum SessionError {
        #[error(transparent)]
        /// The middleware ran twice on the same request.
        DuplicateMiddleware(#[from] DuplicateMiddlewareError),
        #[error("Failed to load the session record from the store.")]
        /// Failed to load the session record from the store.
        Load(#[from] crate::store::errors::LoadError),
        #[error("Failed to commit the session.")]
        /// Failed to commit the session.
        Commit(#[from] crate::state::errors::CommitError),
    }
}
