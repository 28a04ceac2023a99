//! ERP wire types.
//!
//! Field names follow the ERP's PascalCase JSON. Collections are kept as
//! `serde_json::Value` and reconciled by `sync::mapping`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Body of `POST /Devices/Register/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(rename = "Cypher")]
    pub cypher: String,
    #[serde(rename = "IV")]
    pub iv: String,
    #[serde(rename = "IntegrationID")]
    pub integration_id: u32,
}

/// Server half of the registration handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    #[serde(rename = "Cypher")]
    pub cypher: String,
    #[serde(rename = "IV")]
    pub iv: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct LoginRequest<'a> {
    #[serde(rename = "UserName")]
    pub user_name: &'a str,
    #[serde(rename = "PasswordHash")]
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "Token")]
    pub token: String,
    #[serde(rename = "UserID", default)]
    pub user_id: Option<Value>,
    #[serde(rename = "Title", default)]
    pub title: Option<String>,
}

/// Result of the `GET /General/GenerationVersion/` probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationInfo {
    #[serde(rename = "GenerationVersion", deserialize_with = "string_or_number")]
    pub generation_version: String,
    #[serde(rename = "LockNumber", default, deserialize_with = "optional_string_or_number")]
    pub lock_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct InvoiceFromQuotationRequest {
    // Vendor spelling
    #[serde(rename = "QuatationID")]
    pub quotation_id: i64,
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    scalar_to_string(value)
        .ok_or_else(|| serde::de::Error::custom("expected a string or a number"))
}

fn optional_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(scalar_to_string))
}
