//! Report backend abstraction

use crate::errors::Result;

/// One report request, in configfs-tsm terms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportRequest {
    pub in_blob: Vec<u8>,
    pub privilege_level: u32,
    pub get_aux_blob: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportResponse {
    pub provider: String,
    pub service_provider: Option<String>,
    pub out_blob: Vec<u8>,
    pub aux_blob: Vec<u8>,
    pub manifest_blob: Option<Vec<u8>>,
}

/// A source of TSM reports. Implementations block; callers run them off
/// the async executor.
pub trait ReportClient: Send + Sync {
    /// Whether reports can be produced at all
    fn available(&self) -> Result<()>;

    fn get_report(&self, request: &ReportRequest) -> Result<ReportResponse>;
}
