use crate::codec_::SessionCodec;
use crate::store_::SessionRecord;
use crate::{SessionConfig, SessionId};
use biscotti::{Processor, RequestCookies};
use http::header::{COOKIE, ToStrError};
use tracing_log_error::log_error;

/// The session information carried by the incoming request, if any.
///
/// Built using [`IncomingSession::extract`].
pub enum IncomingSession {
    /// The cookie carried the whole session payload.
    Record(SessionRecord),
    /// The cookie carried the identifier of a record held in an external store.
    ExternalKey(SessionId),
}

impl IncomingSession {
    /// Extract a session cookie from the incoming request, if it exists.
    ///
    /// `store_backed` selects the interpretation of the cookie value: the bare
    /// identifier of an external record, or the encoded session payload.
    ///
    /// A missing cookie returns `None`. A payload that fails to decode also
    /// returns `None`: the client gets a fresh session rather than an error.
    pub fn extract(
        cookies: &RequestCookies<'_>,
        config: &SessionConfig,
        codec: &dyn SessionCodec,
        store_backed: bool,
    ) -> Option<Self> {
        let cookie = cookies.get(&config.cookie.name)?;
        let value = cookie.value();
        if store_backed {
            if value.is_empty() {
                return None;
            }
            return Some(Self::ExternalKey(SessionId::from(value)));
        }
        match codec.decode(value) {
            Ok(record) => Some(Self::Record(record)),
            Err(e) => {
                log_error!(
                    e,
                    level: tracing::Level::WARN,
                    "Invalid session payload, starting a fresh session"
                );
                None
            }
        }
    }

    /// An incoming session carrying a full record, as decoded from a cookie.
    pub fn from_record(record: SessionRecord) -> Self {
        Self::Record(record)
    }

    /// An incoming session carrying the key of an externally-stored record.
    pub fn from_external_key(id: SessionId) -> Self {
        Self::ExternalKey(id)
    }
}

/// Parse cookies out of the incoming request headers.
pub(crate) fn extract_request_cookies<'request>(
    headers: &'request http::HeaderMap,
    processor: &Processor,
) -> Result<RequestCookies<'request>, ExtractRequestCookiesError> {
    let cookie_headers = headers
        .get_all(COOKIE)
        .into_iter()
        .map(|h| h.to_str())
        .collect::<Result<Vec<_>, _>>()?;
    let cookies = RequestCookies::parse_headers(cookie_headers.into_iter(), processor)?;
    Ok(cookies)
}

#[derive(Debug, thiserror::Error)]
/// The error returned by [`extract_request_cookies`].
pub enum ExtractRequestCookiesError {
    #[error("Some characters in the `Cookie` header aren't printable ASCII characters.")]
    /// Some characters in the `Cookie` header aren't printable ASCII characters.
    InvalidHeaderValue(#[from] ToStrError),
    #[error("Failed to parse request cookies out of the `Cookie` header.")]
    /// Failed to parse request cookies out of the `Cookie` header.
    ParseError(#[from] biscotti::errors::ParseError),
}
