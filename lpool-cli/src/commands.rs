use leslies_pool::{Coordinator, LesliesPoolApi, SensorData};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::error::Result;
use crate::output::OutputManager;

pub struct CommandExecutor {
    config: AppConfig,
    output: OutputManager,
}

impl CommandExecutor {
    pub fn new(config: AppConfig, colored: bool) -> Self {
        Self {
            config,
            output: OutputManager::new(colored),
        }
    }

    fn build_api(&self) -> Result<LesliesPoolApi> {
        self.config.validate()?;
        Ok(LesliesPoolApi::new(
            self.config.credentials(),
            self.config.client_options(),
        )?)
    }

    pub async fn fetch(&self, format: OutputFormat) -> Result<()> {
        let mut api = self.build_api()?;
        let outcome = api.fetch_water_test_data().await?;
        if outcome.is_empty() {
            warn!("No water test data returned");
        }
        let data = SensorData::from_outcome(outcome);
        println!("{}", self.output.format_sensor_data(&data, format)?);
        Ok(())
    }

    /// Poll until Ctrl-C, or until `count` updates have been printed.
    pub async fn poll(&self, format: OutputFormat, count: Option<u64>) -> Result<()> {
        let api = self.build_api()?;
        let coordinator = Coordinator::new(api, self.config.scan_interval());
        let mut updates = coordinator.subscribe();

        let cancellation_token = CancellationToken::new();
        let handle = tokio::spawn(coordinator.run(cancellation_token.clone()));

        let mut printed = 0u64;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl-C, stopping");
                    break;
                }
                changed = updates.changed() => {
                    if changed.is_err() {
                        debug!("Coordinator stopped publishing");
                        break;
                    }
                    let state = updates.borrow_and_update().clone();
                    println!("{}", self.output.format_state(&state, format)?);

                    printed += 1;
                    if count.is_some_and(|max| printed >= max) {
                        break;
                    }
                }
            }
        }

        cancellation_token.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "Polling task ended abnormally");
        }
        Ok(())
    }
}
