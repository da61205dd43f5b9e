//! Static evidence backend for `ratsd mock`
//!
//! Serves canned evidence from a JSON file instead of running plugins:
//!
//! ```json
//! {"attesters": {"mock-tsm": {"content-type": "application/vnd.veraison.configfs-tsm+json", "evidence": "eyJ..."}}}
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use ratsd_plugin::{
    EvidenceIn, EvidenceOut, Format, PluginError, PluginManager, SubAttester, SubAttesterIdOut,
    SupportedFormatsOut,
};
use serde::Deserialize;

const MOCK_NONCE_SIZE: u32 = 64;
const MOCK_VERSION: &str = "mock";

#[derive(Debug, Deserialize)]
struct EvidenceFile {
    #[serde(default)]
    attesters: BTreeMap<String, CannedEvidence>,
}

#[derive(Debug, Clone, Deserialize)]
struct CannedEvidence {
    #[serde(rename = "content-type")]
    content_type: String,
    #[serde(with = "ratsd_plugin::wire::base64_bytes")]
    evidence: Vec<u8>,
}

pub struct MockAttester {
    name: String,
    canned: CannedEvidence,
}

#[async_trait]
impl SubAttester for MockAttester {
    async fn get_sub_attester_id(&self) -> SubAttesterIdOut {
        SubAttesterIdOut::success(self.name.clone(), MOCK_VERSION)
    }

    async fn get_supported_formats(&self) -> SupportedFormatsOut {
        SupportedFormatsOut::success(vec![Format::new(
            self.canned.content_type.clone(),
            MOCK_NONCE_SIZE,
        )])
    }

    async fn get_evidence(&self, request: EvidenceIn) -> EvidenceOut {
        if request.content_type != self.canned.content_type {
            return EvidenceOut::failure(format!(
                "no supported format in {} matches the requested format",
                self.name
            ));
        }

        EvidenceOut::success(self.canned.evidence.clone())
    }
}

/// [`PluginManager`] serving canned evidence
pub struct MockManager {
    attesters: BTreeMap<String, Arc<MockAttester>>,
}

impl MockManager {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read mock evidence {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid mock evidence {}", path.display()))
    }

    pub fn from_json(raw: &[u8]) -> Result<Self> {
        let file: EvidenceFile = serde_json::from_slice(raw)?;
        if file.attesters.is_empty() {
            bail!("no attesters in mock evidence");
        }

        let attesters = file
            .attesters
            .into_iter()
            .map(|(name, canned)| {
                tracing::info!(attester = %name, content_type = %canned.content_type, "mock attester");
                let attester = Arc::new(MockAttester {
                    name: name.clone(),
                    canned,
                });
                (name, attester)
            })
            .collect();

        Ok(Self { attesters })
    }
}

#[async_trait]
impl PluginManager for MockManager {
    async fn init(&mut self) -> ratsd_plugin::Result<()> {
        Ok(())
    }

    fn plugin_list(&self) -> Vec<String> {
        self.attesters.keys().cloned().collect()
    }

    fn lookup_by_name(&self, name: &str) -> ratsd_plugin::Result<Arc<dyn SubAttester>> {
        self.attesters
            .get(name)
            .map(|a| Arc::clone(a) as Arc<dyn SubAttester>)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))
    }

    async fn close(&self) -> ratsd_plugin::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const EVIDENCE: &str = r#"{
        "attesters": {
            "mock-tsm": {"content-type": "application/vnd.veraison.configfs-tsm+json", "evidence": "e30="},
            "cca": {"content-type": "application/eat+cbor", "evidence": "oA=="}
        }
    }"#;

    #[tokio::test]
    async fn serves_canned_evidence() {
        let manager = MockManager::from_json(EVIDENCE.as_bytes()).unwrap();
        assert_eq!(manager.plugin_list(), vec!["cca", "mock-tsm"]);

        let attester = manager.lookup_by_name("mock-tsm").unwrap();
        let formats = attester.get_supported_formats().await;
        assert_eq!(formats.formats[0].nonce_size, 64);

        let out = attester
            .get_evidence(EvidenceIn {
                content_type: "application/vnd.veraison.configfs-tsm+json".to_string(),
                nonce: vec![0; 64],
                options: Vec::new(),
            })
            .await;
        assert!(out.status.result);
        assert_eq!(out.evidence, b"{}");
    }

    #[tokio::test]
    async fn wrong_content_type_fails() {
        let manager = MockManager::from_json(EVIDENCE.as_bytes()).unwrap();
        let out = manager
            .lookup_by_name("cca")
            .unwrap()
            .get_evidence(EvidenceIn {
                content_type: "application/json".to_string(),
                nonce: vec![0; 64],
                options: Vec::new(),
            })
            .await;
        assert!(!out.status.result);
        assert!(out.status.error.contains("no supported format"));
    }

    #[test]
    fn empty_or_malformed_files_are_rejected() {
        assert!(MockManager::from_json(br#"{"attesters": {}}"#).is_err());
        assert!(MockManager::from_json(b"{}").is_err());
        assert!(MockManager::from_json(
            br#"{"attesters": {"x": {"content-type": "a", "evidence": "!!"}}}"#
        )
        .is_err());
    }

    #[test]
    fn unknown_attester_is_not_found() {
        let manager = MockManager::from_json(EVIDENCE.as_bytes()).unwrap();
        assert!(matches!(
            manager.lookup_by_name("nope"),
            Err(PluginError::NotFound(_))
        ));
    }
}
