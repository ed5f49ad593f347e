//! The uniform `{success, message, data}` response wrapper and typed access
//! to its `data` payload.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{OneApiError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

/// A decoded envelope plus the `session` cookie the response carried.
#[derive(Debug, Clone, Default)]
pub struct ApiResponse {
    pub session_id: Option<String>,
    pub envelope: Envelope,
}

impl ApiResponse {
    pub fn data(&self) -> &Value {
        &self.envelope.data
    }

    /// Deserialize `data` into `T`; any missing field or type mismatch is a
    /// `Shape` error labelled with `context`.
    pub fn decode_data<T: DeserializeOwned>(&self, context: &'static str) -> Result<T> {
        decode_value(&self.envelope.data, context)
    }
}

pub fn decode_value<T: DeserializeOwned>(value: &Value, context: &'static str) -> Result<T> {
    T::deserialize(value).map_err(|source| OneApiError::Shape { context, source })
}

/// Treats an absent or `null` string field as empty.
pub(crate) fn nullable_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Value of cookie `name` from a single `Set-Cookie` header, ignoring attributes.
pub fn parse_set_cookie(header: &str, name: &str) -> Option<String> {
    let pair = header.split(';').next()?;
    let (key, value) = pair.trim().split_once('=')?;
    if key.trim() == name {
        Some(value.trim().trim_matches('"').to_string())
    } else {
        None
    }
}
