//! The TSM sub-attester
//!
//! Wraps a [`ReportClient`] behind the plugin contract: negotiates one of
//! the media types of its [`Profile`], reads `privilege_level` from the
//! caller's options and encodes the report as a [`TsmReport`].

use std::sync::Arc;

use async_trait::async_trait;
use ratsd_plugin::{
    DataType, EvidenceIn, EvidenceOut, Format, OptionDescriptor, OptionsOut, SubAttester,
    SubAttesterIdOut, SupportedFormatsOut,
};
use ratsd_tokens::{BinaryString, TsmReport};
use serde_json::{Map, Value};

use crate::configfs::LinuxTsm;
use crate::fake::FakeTsm;
use crate::report::{ReportClient, ReportRequest, ReportResponse};

pub const TSM_JSON_MEDIA_TYPE: &str = "application/vnd.veraison.configfs-tsm+json";
pub const TSM_CBOR_MEDIA_TYPE: &str = "application/vnd.veraison.configfs-tsm+cbor";
pub const TSM_NONCE_SIZE: usize = 64;

pub const MOCK_TSM_MEDIA_TYPE: &str = "application/vnd.veraison.mock-tsm+json";
pub const MOCK_TSM_NONCE_SIZE: usize = 32;

pub const PRIVILEGE_LEVEL_OPTION: &str = "privilege_level";

/// What an attester advertises and how it names itself in errors
#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub name: &'static str,
    pub version: &'static str,
    /// First entry is the default format
    pub media_types: &'static [&'static str],
    pub nonce_size: usize,
    pub label: &'static str,
}

pub const TSM_REPORT: Profile = Profile {
    name: "tsm-report",
    version: "1.0.0",
    media_types: &[TSM_JSON_MEDIA_TYPE, TSM_CBOR_MEDIA_TYPE],
    nonce_size: TSM_NONCE_SIZE,
    label: "tsm plugin",
};

pub const MOCK_TSM: Profile = Profile {
    name: "mock-tsm",
    version: "1.0.0",
    media_types: &[MOCK_TSM_MEDIA_TYPE],
    nonce_size: MOCK_TSM_NONCE_SIZE,
    label: "mock TSM plugin",
};

pub struct TsmAttester {
    profile: Profile,
    client: Arc<dyn ReportClient>,
}

impl TsmAttester {
    pub fn new(profile: Profile, client: Arc<dyn ReportClient>) -> Self {
        Self { profile, client }
    }

    /// `tsm-report` over the kernel's configfs interface
    pub fn linux() -> Self {
        Self::new(TSM_REPORT, Arc::new(LinuxTsm::default()))
    }

    /// `mock-tsm` over [`FakeTsm`]
    pub fn mock() -> Self {
        Self::new(MOCK_TSM, Arc::new(FakeTsm))
    }

    pub fn name(&self) -> &str {
        self.profile.name
    }

    fn formats(&self) -> Vec<Format> {
        self.profile
            .media_types
            .iter()
            .map(|media_type| Format::new(*media_type, self.profile.nonce_size as u32))
            .collect()
    }
}

/// Extract the privilege level from the raw option object. Absent means 0.
pub fn privilege_level(raw: &[u8]) -> Result<u32, String> {
    if raw.is_empty() {
        return Ok(0);
    }

    let options: Map<String, Value> = serde_json::from_slice(raw)
        .map_err(|e| format!("failed to parse {}: {e}", String::from_utf8_lossy(raw)))?;

    match options.get(PRIVILEGE_LEVEL_OPTION) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| format!("{PRIVILEGE_LEVEL_OPTION} {s} is invalid")),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| format!("{PRIVILEGE_LEVEL_OPTION} {n} is invalid")),
        Some(other) => Err(format!("{PRIVILEGE_LEVEL_OPTION} {other} is invalid")),
    }
}

fn encode(response: ReportResponse, content_type: &str) -> ratsd_tokens::Result<Vec<u8>> {
    let report = TsmReport {
        provider: response.provider,
        service_provider: response.service_provider,
        out_blob: BinaryString::new(response.out_blob),
        aux_blob: BinaryString::new(response.aux_blob),
        manifest_blob: response.manifest_blob.map(BinaryString::new),
    };

    if content_type == TSM_CBOR_MEDIA_TYPE {
        report.to_cbor()
    } else {
        report.to_json()
    }
}

#[async_trait]
impl SubAttester for TsmAttester {
    async fn get_sub_attester_id(&self) -> SubAttesterIdOut {
        SubAttesterIdOut::success(self.profile.name, self.profile.version)
    }

    async fn get_supported_formats(&self) -> SupportedFormatsOut {
        if let Err(e) = self.client.available() {
            return SupportedFormatsOut::failure(format!("TSM is not available: {e}"));
        }
        SupportedFormatsOut::success(self.formats())
    }

    async fn get_options(&self) -> OptionsOut {
        OptionsOut::success(vec![OptionDescriptor::new(
            PRIVILEGE_LEVEL_OPTION,
            DataType::String,
        )])
    }

    async fn get_evidence(&self, request: EvidenceIn) -> EvidenceOut {
        let Profile {
            name,
            nonce_size,
            label,
            ..
        } = self.profile;

        if request.nonce.len() != nonce_size {
            return EvidenceOut::failure(format!(
                "nonce size of the TSM attester should be {nonce_size}, got {}",
                request.nonce.len()
            ));
        }

        if !self.profile.media_types.contains(&request.content_type.as_str()) {
            return EvidenceOut::failure(format!(
                "no supported format in {label} matches the requested format"
            ));
        }

        let privilege_level = match privilege_level(&request.options) {
            Ok(level) => level,
            Err(e) => return EvidenceOut::failure(e),
        };

        let report_request = ReportRequest {
            in_blob: request.nonce,
            privilege_level,
            get_aux_blob: true,
        };
        let client = Arc::clone(&self.client);
        let response =
            match tokio::task::spawn_blocking(move || client.get_report(&report_request)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => return EvidenceOut::failure(format!("failed to get TSM report: {e}")),
                Err(e) => return EvidenceOut::failure(format!("failed to get TSM report: {e}")),
            };

        match encode(response, &request.content_type) {
            Ok(evidence) => {
                tracing::info!(
                    attester = name,
                    content_type = %request.content_type,
                    privilege_level,
                    "TSM evidence produced"
                );
                EvidenceOut::success(evidence)
            }
            Err(e) => EvidenceOut::failure(format!("failed to encode TSM report: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NONCE: &[u8; 64] = b"abcdefghijklmnopqrstuvwxyz123456abcdefghijklmnopqrstuvwxyz123456";

    fn request(content_type: &str, nonce: &[u8], options: &str) -> EvidenceIn {
        EvidenceIn {
            content_type: content_type.to_string(),
            nonce: nonce.to_vec(),
            options: options.as_bytes().to_vec(),
        }
    }

    /// The `tsm-report` profile over the fake backend
    fn tsm() -> TsmAttester {
        TsmAttester::new(TSM_REPORT, Arc::new(FakeTsm))
    }

    #[tokio::test]
    async fn identity_and_options() {
        let attester = TsmAttester::mock();
        let id = attester.get_sub_attester_id().await;
        let id = id.sub_attester_id.unwrap();
        assert_eq!((id.name.as_str(), id.version.as_str()), ("mock-tsm", "1.0.0"));

        let options = attester.get_options().await;
        assert_eq!(
            options.options,
            vec![OptionDescriptor::new("privilege_level", DataType::String)]
        );
    }

    #[tokio::test]
    async fn profiles_advertise_their_formats() {
        let formats = tsm().get_supported_formats().await.formats;
        assert_eq!(
            formats,
            vec![
                Format::new(TSM_JSON_MEDIA_TYPE, 64),
                Format::new(TSM_CBOR_MEDIA_TYPE, 64)
            ]
        );

        let formats = TsmAttester::mock().get_supported_formats().await.formats;
        assert_eq!(formats, vec![Format::new(MOCK_TSM_MEDIA_TYPE, 32)]);
    }

    #[tokio::test]
    async fn unavailable_backend_fails_format_query() {
        let dir = tempfile::tempdir().unwrap();
        let attester = TsmAttester::new(
            TSM_REPORT,
            Arc::new(LinuxTsm::new(dir.path().join("missing"))),
        );

        let out = attester.get_supported_formats().await;
        assert!(!out.status.result);
        assert!(out.status.error.starts_with("TSM is not available: "));
    }

    #[tokio::test]
    async fn wrong_nonce_size() {
        let out = tsm()
            .get_evidence(request(TSM_JSON_MEDIA_TYPE, &NONCE[..32], ""))
            .await;
        assert_eq!(
            out.status.error,
            "nonce size of the TSM attester should be 64, got 32"
        );

        let out = TsmAttester::mock()
            .get_evidence(request(MOCK_TSM_MEDIA_TYPE, NONCE, ""))
            .await;
        assert_eq!(
            out.status.error,
            "nonce size of the TSM attester should be 32, got 64"
        );
    }

    #[tokio::test]
    async fn unknown_format() {
        let out = tsm().get_evidence(request("mediaType", NONCE, "")).await;
        assert_eq!(
            out.status.error,
            "no supported format in tsm plugin matches the requested format"
        );

        let out = TsmAttester::mock()
            .get_evidence(request(TSM_JSON_MEDIA_TYPE, &NONCE[..32], ""))
            .await;
        assert_eq!(
            out.status.error,
            "no supported format in mock TSM plugin matches the requested format"
        );
    }

    #[tokio::test]
    async fn invalid_options() {
        let cases = [
            (r#"{"privilege_level": "invalid"}"#, "privilege_level invalid is invalid"),
            (r#"{"privilege_level": "-20"}"#, "privilege_level -20 is invalid"),
            (r#"{"privilege_level": true}"#, "privilege_level true is invalid"),
        ];
        for (options, expected) in cases {
            let out = tsm()
                .get_evidence(request(TSM_JSON_MEDIA_TYPE, NONCE, options))
                .await;
            assert!(!out.status.result);
            assert_eq!(out.status.error, expected);
        }

        let out = tsm()
            .get_evidence(request(TSM_JSON_MEDIA_TYPE, NONCE, r#"{"privilege_level"}"#))
            .await;
        assert!(out
            .status
            .error
            .starts_with(r#"failed to parse {"privilege_level"}: "#));
    }

    #[test]
    fn privilege_level_defaults_to_zero() {
        assert_eq!(privilege_level(b""), Ok(0));
        assert_eq!(privilege_level(br#"{"content-type": "x"}"#), Ok(0));
        assert_eq!(privilege_level(br#"{"privilege_level": "3"}"#), Ok(3));
        assert_eq!(privilege_level(br#"{"privilege_level": 2}"#), Ok(2));
    }

    #[tokio::test]
    async fn json_and_cbor_reports() {
        let attester = tsm();

        let out = attester
            .get_evidence(request(TSM_JSON_MEDIA_TYPE, NONCE, r#"{"privilege_level": "1"}"#))
            .await;
        assert!(out.status.result, "{}", out.status.error);
        let report = TsmReport::from_json(&out.evidence).unwrap();
        assert_eq!(report.provider, "fake\n");
        assert_eq!(report.aux_blob, BinaryString::new("auxblob"));
        assert_eq!(
            report.out_blob,
            BinaryString::new(format!("privlevel: 1\ninblob: {}", hex::encode(NONCE)))
        );

        let out = attester
            .get_evidence(request(TSM_CBOR_MEDIA_TYPE, NONCE, ""))
            .await;
        let report = TsmReport::from_cbor(&out.evidence).unwrap();
        assert_eq!(
            report.out_blob,
            BinaryString::new(format!("privlevel: 0\ninblob: {}", hex::encode(NONCE)))
        );
    }

    #[tokio::test]
    async fn mock_report_is_json() {
        let nonce = &NONCE[..32];
        let out = TsmAttester::mock()
            .get_evidence(request(MOCK_TSM_MEDIA_TYPE, nonce, ""))
            .await;
        assert!(out.status.result, "{}", out.status.error);

        let report = TsmReport::from_json(&out.evidence).unwrap();
        assert_eq!(report.provider, "fake\n");
        assert_eq!(
            report.out_blob,
            BinaryString::new(format!("privlevel: 0\ninblob: {}", hex::encode(nonce)))
        );
    }
}
