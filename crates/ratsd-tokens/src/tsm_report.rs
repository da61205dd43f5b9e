//! configfs-tsm report token
//!
//! A [`TsmReport`] is the evidence payload emitted by the TSM sub-attesters.
//! It round-trips through JSON and CBOR; binary fields stay byte strings in
//! CBOR and become standard base64 in JSON.

use serde::{Deserialize, Serialize};

use crate::binary::BinaryString;
use crate::errors::{Result, TokenError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TsmReport {
    /// TSM provider that produced the report (e.g. `sev_guest`, `tdx_guest`)
    #[serde(default)]
    pub provider: String,

    /// Service provider (e.g. `svsm`); when set, a manifest blob is mandatory
    #[serde(
        rename = "service_provider",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub service_provider: Option<String>,

    #[serde(rename = "outblob", default)]
    pub out_blob: BinaryString,

    #[serde(rename = "auxblob", default)]
    pub aux_blob: BinaryString,

    #[serde(
        rename = "manifestblob",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub manifest_blob: Option<BinaryString>,
}

impl TsmReport {
    /// Check field presence.
    ///
    /// `provider`, `outblob` and `auxblob` are always mandatory, in that
    /// order. `manifestblob` is mandatory iff a service provider is set and
    /// is a stray field otherwise.
    pub fn valid(&self) -> Result<()> {
        if self.provider.is_empty() {
            return Err(TokenError::MissingField("provider"));
        }
        if self.out_blob.is_empty() {
            return Err(TokenError::MissingField("outblob"));
        }
        if self.aux_blob.is_empty() {
            return Err(TokenError::MissingField("auxblob"));
        }

        let has_service_provider = self
            .service_provider
            .as_deref()
            .is_some_and(|sp| !sp.is_empty());
        let has_manifest = self.manifest_blob.as_ref().is_some_and(|m| !m.is_empty());

        match (has_service_provider, has_manifest) {
            (true, false) => Err(TokenError::MissingField("manifestblob")),
            (false, true) => Err(TokenError::StrayField("manifestblob")),
            _ => Ok(()),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        self.valid()?;
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        let report: Self = serde_json::from_slice(data)?;
        report.valid()?;
        Ok(report)
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        self.valid()?;
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| TokenError::CborEncode(e.to_string()))?;
        Ok(buf)
    }

    pub fn from_cbor(data: &[u8]) -> Result<Self> {
        let report: Self =
            ciborium::from_reader(data).map_err(|e| TokenError::CborDecode(e.to_string()))?;
        report.valid()?;
        Ok(report)
    }
}
