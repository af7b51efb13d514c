use crate::{config::ByBucketArgs, state::AppState};
use anyhow::Result;
use std::process::ExitCode;

/// Print every tenant assigned to the bucket, one per line.
pub async fn run(state: &AppState, args: &ByBucketArgs) -> Result<ExitCode> {
    for tenant in state.migrator.tenants_for_bucket(&args.bucket).await? {
        println!("{}", tenant);
    }
    Ok(ExitCode::SUCCESS)
}
