//! Host/plugin wire protocol
//!
//! The host starts the plugin with the magic cookie in its environment. The
//! plugin answers with a single handshake line on stdout,
//! `CORE|APP|TYPE|CODEC`, then serves newline-delimited JSON-RPC 2.0 until
//! its stdin closes.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAGIC_COOKIE_KEY: &str = "RATSD_PLUGIN";
pub const MAGIC_COOKIE_VALUE: &str = "RATSD";
pub const PROTOCOL_VERSION_KEY: &str = "RATSD_PLUGIN_PROTOCOL_VERSION";

pub const CORE_PROTOCOL_VERSION: u32 = 1;
pub const APP_PROTOCOL_VERSION: u32 = 1;
pub const PLUGIN_TYPE: &str = "subattester";
pub const CODEC: &str = "jsonrpc";

pub mod method {
    pub const GET_SUB_ATTESTER_ID: &str = "GetSubAttesterID";
    pub const GET_SUPPORTED_FORMATS: &str = "GetSupportedFormats";
    pub const GET_OPTIONS: &str = "GetOptions";
    pub const GET_EVIDENCE: &str = "GetEvidence";
}

pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub core_version: u32,
    pub app_version: u32,
    pub plugin_type: String,
    pub codec: String,
}

impl Handshake {
    /// The handshake this build speaks
    pub fn current() -> Self {
        Self {
            core_version: CORE_PROTOCOL_VERSION,
            app_version: APP_PROTOCOL_VERSION,
            plugin_type: PLUGIN_TYPE.to_string(),
            codec: CODEC.to_string(),
        }
    }

    /// Parse a handshake line. Anything that is not four `|`-separated
    /// fields with numeric versions is not a handshake at all.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.trim().split('|');
        let core_version = parts.next()?.parse().ok()?;
        let app_version = parts.next()?.parse().ok()?;
        let plugin_type = parts.next()?.to_string();
        let codec = parts.next()?.to_string();
        if parts.next().is_some() {
            return None;
        }

        Some(Self {
            core_version,
            app_version,
            plugin_type,
            codec,
        })
    }

    pub fn same_kind(&self, other: &Self) -> bool {
        self.plugin_type == other.plugin_type && self.codec == other.codec
    }

    pub fn same_version(&self, other: &Self) -> bool {
        self.core_version == other.core_version && self.app_version == other.app_version
    }
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.core_version, self.app_version, self.plugin_type, self.codec
        )
    }
}

// ── JSON-RPC 2.0 types ─────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn result(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<u64>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

/// `#[serde(with = ...)]` helper carrying bytes as standard base64
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
