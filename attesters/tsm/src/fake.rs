use crate::errors::Result;
use crate::report::{ReportClient, ReportRequest, ReportResponse};

pub const FAKE_PROVIDER: &str = "fake\n";
pub const FAKE_AUX_BLOB: &[u8] = b"auxblob";

/// Deterministic backend that echoes its inputs.
///
/// The outblob is `privlevel: <n>\ninblob: <hex nonce>`, which lets tests
/// check exactly what reached the backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeTsm;

impl ReportClient for FakeTsm {
    fn available(&self) -> Result<()> {
        Ok(())
    }

    fn get_report(&self, request: &ReportRequest) -> Result<ReportResponse> {
        let out_blob = format!(
            "privlevel: {}\ninblob: {}",
            request.privilege_level,
            hex::encode(&request.in_blob)
        );

        Ok(ReportResponse {
            provider: FAKE_PROVIDER.to_string(),
            service_provider: None,
            out_blob: out_blob.into_bytes(),
            aux_blob: if request.get_aux_blob {
                FAKE_AUX_BLOB.to_vec()
            } else {
                Vec::new()
            },
            manifest_blob: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echoes_privilege_level_and_nonce() {
        let response = FakeTsm
            .get_report(&ReportRequest {
                in_blob: vec![0xde, 0xad],
                privilege_level: 2,
                get_aux_blob: true,
            })
            .unwrap();

        assert_eq!(response.provider, "fake\n");
        assert_eq!(response.out_blob, b"privlevel: 2\ninblob: dead");
        assert_eq!(response.aux_blob, b"auxblob");
    }
}
