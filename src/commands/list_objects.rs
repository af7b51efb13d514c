use crate::{config::ListObjectsArgs, state::AppState};
use anyhow::Result;
use std::process::ExitCode;

/// Print the keys of every object the tenant owns, or only their number.
pub async fn run(state: &AppState, args: &ListObjectsArgs) -> Result<ExitCode> {
    if state.tenants.get(&args.tenant).await?.is_none() {
        tracing::error!("Unknown tenant {}", args.tenant);
        return Ok(ExitCode::FAILURE);
    }

    if args.count {
        println!("{}", state.migrator.count_objects(&args.tenant).await?);
    } else {
        for key in state.migrator.list_objects(&args.tenant).await? {
            println!("{}", key);
        }
    }
    Ok(ExitCode::SUCCESS)
}
