//! The sub-attester capability interface
//!
//! Every sub-attester implements [`SubAttester`]. The same trait is
//! implemented by the in-process attester (plugin side) and by the
//! [`PluginClient`](crate::client::PluginClient) proxy (host side), so the
//! compositor never knows which one it is talking to.
//!
//! All results carry a [`Status`] instead of a Rust error: failures cross
//! the process boundary as data.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::wire;

#[async_trait]
pub trait SubAttester: Send + Sync {
    /// Self-reported identity, used as the registry key
    async fn get_sub_attester_id(&self) -> SubAttesterIdOut;

    /// Output formats in order of preference; the first one is the default
    async fn get_supported_formats(&self) -> SupportedFormatsOut;

    /// Per-call parameters the attester understands
    async fn get_options(&self) -> OptionsOut {
        OptionsOut::success(Vec::new())
    }

    async fn get_evidence(&self, input: EvidenceIn) -> EvidenceOut;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub result: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl Status {
    pub fn success() -> Self {
        Self {
            result: true,
            error: String::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            result: false,
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubAttesterId {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAttesterIdOut {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_attester_id: Option<SubAttesterId>,
}

impl SubAttesterIdOut {
    pub fn success(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            status: Status::success(),
            sub_attester_id: Some(SubAttesterId {
                name: name.into(),
                version: version.into(),
            }),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: Status::failure(error),
            sub_attester_id: None,
        }
    }
}

/// An output format and the exact nonce length it requires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    pub content_type: String,
    pub nonce_size: u32,
}

impl Format {
    pub fn new(content_type: impl Into<String>, nonce_size: u32) -> Self {
        Self {
            content_type: content_type.into(),
            nonce_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedFormatsOut {
    pub status: Status,
    #[serde(default)]
    pub formats: Vec<Format>,
}

impl SupportedFormatsOut {
    pub fn success(formats: Vec<Format>) -> Self {
        Self {
            status: Status::success(),
            formats,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: Status::failure(error),
            formats: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Integer,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionDescriptor {
    pub name: String,
    #[serde(rename = "data-type")]
    pub data_type: DataType,
}

impl OptionDescriptor {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionsOut {
    pub status: Status,
    #[serde(default)]
    pub options: Vec<OptionDescriptor>,
}

impl OptionsOut {
    pub fn success(options: Vec<OptionDescriptor>) -> Self {
        Self {
            status: Status::success(),
            options,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: Status::failure(error),
            options: Vec::new(),
        }
    }
}

/// One evidence request.
///
/// `options` is the caller's per-attester option object as raw JSON bytes;
/// the host never interprets it beyond the `content-type` key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceIn {
    pub content_type: String,
    #[serde(with = "wire::base64_bytes")]
    pub nonce: Vec<u8>,
    #[serde(default, with = "wire::base64_bytes")]
    pub options: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceOut {
    pub status: Status,
    #[serde(default, with = "wire::base64_bytes")]
    pub evidence: Vec<u8>,
}

impl EvidenceOut {
    pub fn success(evidence: Vec<u8>) -> Self {
        Self {
            status: Status::success(),
            evidence,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: Status::failure(error),
            evidence: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn failed_status_never_carries_payload() {
        let out = EvidenceOut::failure("boom");
        assert!(!out.status.is_success());
        assert!(out.evidence.is_empty());

        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["status"], serde_json::json!({"result": false, "error": "boom"}));
    }

    #[test]
    fn evidence_request_bytes_are_base64() {
        let input = EvidenceIn {
            content_type: "a/b".into(),
            nonce: vec![0xff; 3],
            options: br#"{"k":"v"}"#.to_vec(),
        };

        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["nonce"], "////");
        assert_eq!(json["options"], "eyJrIjoidiJ9");

        let back: EvidenceIn = serde_json::from_value(json).unwrap();
        assert_eq!(back, input);
    }

    #[test]
    fn option_descriptor_uses_dashed_data_type() {
        let d = OptionDescriptor::new("privilege_level", DataType::String);
        assert_eq!(
            serde_json::to_string(&d).unwrap(),
            r#"{"name":"privilege_level","data-type":"string"}"#
        );
    }
}
