use std::process::ExitCode;

use ratsd_tsm::TsmAttester;

#[tokio::main]
async fn main() -> ExitCode {
    ratsd_tsm::run_plugin("tsm-report", TsmAttester::linux()).await
}
