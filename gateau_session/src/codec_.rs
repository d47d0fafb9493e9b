use crate::store_::{SessionRecord, SessionRecordRef};
use crate::wire::WireRecord;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use errors::{DecodeError, EncodeError};
use jiff::Timestamp;

/// How session state is converted to and from the session cookie value
/// when sessions are cookie-backed.
///
/// A custom codec can be installed via
/// [`SessionMiddlewareBuilder::codec`][crate::SessionMiddlewareBuilder::codec].
/// Codecs don't need to concern themselves with integrity: signing is applied
/// (and verified) on top of the encoded value.
pub trait SessionCodec: std::fmt::Debug + Send + Sync {
    /// Encode a session record into a cookie-safe string.
    fn encode(&self, record: SessionRecordRef<'_>) -> Result<String, EncodeError>;

    /// Decode a cookie value back into a session record.
    fn decode(&self, raw: &str) -> Result<SessionRecord, DecodeError>;
}

#[derive(Debug, Clone, Copy, Default)]
/// The default [`SessionCodec`]: JSON, then URL-safe base64 without padding.
pub struct JsonBase64Codec;

impl SessionCodec for JsonBase64Codec {
    fn encode(&self, record: SessionRecordRef<'_>) -> Result<String, EncodeError> {
        let wire = WireRecord {
            created_at_ms: record.created_at.as_millisecond(),
            data: record.data,
        };
        let json = serde_json::to_string(&wire)?;
        Ok(URL_SAFE_NO_PAD.encode(json.as_bytes()))
    }

    fn decode(&self, raw: &str) -> Result<SessionRecord, DecodeError> {
        let bytes = URL_SAFE_NO_PAD.decode(raw)?;
        let wire: WireRecord<'_> = serde_json::from_slice(&bytes)?;
        let created_at = Timestamp::from_millisecond(wire.created_at_ms)
            .map_err(DecodeError::InvalidCreationTime)?;
        Ok(SessionRecord {
            data: wire.data.into_owned(),
            created_at,
        })
    }
}

/// Errors that can occur when encoding or decoding the session cookie payload.
pub mod errors {
    #[non_exhaustive]
    #[derive(Debug, thiserror::Error)]
    /// The error returned by [`SessionCodec::encode`][super::SessionCodec::encode].
    pub enum EncodeError {
        #[error("Failed to serialize the session state.")]
        /// Failed to serialize the session state.
        SerializationError(#[from] serde_json::Error),
        /// Something else went wrong when encoding the session payload.
        #[error("Something went wrong when encoding the session payload.")]
        Other(#[source] anyhow::Error),
    }

    #[non_exhaustive]
    #[derive(Debug, thiserror::Error)]
    /// The error returned by [`SessionCodec::decode`][super::SessionCodec::decode].
    pub enum DecodeError {
        #[error("The session payload is not valid base64.")]
        /// The session payload is not valid base64.
        Base64(#[from] base64::DecodeError),
        #[error("Failed to deserialize the session state.")]
        /// Failed to deserialize the session state.
        DeserializationError(#[from] serde_json::Error),
        #[error("The session payload carries an out-of-range creation timestamp.")]
        /// The session payload carries an out-of-range creation timestamp.
        InvalidCreationTime(#[source] jiff::Error),
        /// Something else went wrong when decoding the session payload.
        #[error("Something went wrong when decoding the session payload.")]
        Other(#[source] anyhow::Error),
    }
}
