//! configfs-tsm sub-attesters for ratsd
//!
//! Two plugins share one implementation: `tsm-report` reads reports from
//! the kernel's configfs-tsm interface, `mock-tsm` from [`FakeTsm`].

use std::process::ExitCode;

use ratsd_logging::LoggingConfig;
use ratsd_plugin::{PluginError, SubAttester};

pub mod attester;
pub mod configfs;
pub mod errors;
pub mod fake;
pub mod report;

pub use attester::{
    Profile, TsmAttester, MOCK_TSM, MOCK_TSM_MEDIA_TYPE, MOCK_TSM_NONCE_SIZE, TSM_CBOR_MEDIA_TYPE,
    TSM_JSON_MEDIA_TYPE, TSM_NONCE_SIZE, TSM_REPORT,
};
pub use configfs::LinuxTsm;
pub use errors::{Result, TsmError};
pub use fake::FakeTsm;
pub use report::{ReportClient, ReportRequest, ReportResponse};

/// Plugin `main`: logs to stderr and serves `attester` until the host
/// hangs up.
pub async fn run_plugin<A: SubAttester>(service_name: &str, attester: A) -> ExitCode {
    if let Err(e) = ratsd_logging::init_logging(&LoggingConfig::default(), service_name) {
        eprintln!("{service_name}: {e}");
        return ExitCode::FAILURE;
    }

    match ratsd_plugin::serve(attester).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(PluginError::NotLaunchedByHost) => {
            eprintln!(
                "{service_name} is a ratsd plugin and is not meant to be executed directly.\n\
                 Install it as {service_name}.plugin in the ratsd plugin directory."
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "plugin terminated");
            ExitCode::FAILURE
        }
    }
}
