use serde_json::{Map, Value};
use std::borrow::Cow;

#[derive(serde::Deserialize, serde::Serialize)]
/// The schema for the session cookie payload.
///
/// We rename field names to numbers to minimise the size of the payload.
pub(crate) struct WireRecord<'a> {
    #[serde(rename = "0")]
    pub(crate) created_at_ms: i64,
    #[serde(rename = "1", skip_serializing_if = "Map::is_empty", default)]
    pub(crate) data: Cow<'a, Map<String, Value>>,
}
