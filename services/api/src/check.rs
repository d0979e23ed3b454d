use crate::infra::eligibility_service;
use clap::Args;
use std::path::PathBuf;
use swiftvisa::config::AppConfig;
use swiftvisa::eligibility::{relay, RawProfile};
use swiftvisa::error::AppError;
use swiftvisa::telemetry;

#[derive(Args, Debug)]
pub(crate) struct CheckArgs {
    /// JSON file holding the profile exactly as the eligibility form submits it
    pub(crate) profile: PathBuf,
}

pub(crate) async fn run_check(args: CheckArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let contents = tokio::fs::read(&args.profile).await?;
    let profile: RawProfile = serde_json::from_slice(&contents)?;

    let service = eligibility_service(&config)?;
    let response = relay(service.check(profile).await);

    println!("{}", serde_json::to_string_pretty(&response.body)?);
    if !response.is_success() {
        std::process::exit(1);
    }

    Ok(())
}
