use anyhow::Context;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use beacon::{LogEvent, PipelineConfig, TelemetryPipeline, logging};
use uplink::{
    DataUploadConditions, HttpUploader, ManualStatus, NetworkConnectionInfo, NetworkInfoProvider,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PipelineConfig::load().context("loading configuration")?;

    let (logging_config, _guard) =
        logging::init_logging(&config.log_dir).context("initializing logging")?;
    let cancel_token = CancellationToken::new();
    logging_config.start_retention_cleanup(cancel_token.clone());

    let uploader = Arc::new(HttpUploader::new(config.http_uploader_config()?)?);

    // No connectivity or battery sensors on a generic host: never block uploads.
    let network: Arc<dyn NetworkInfoProvider> =
        Arc::new(ManualStatus::<NetworkConnectionInfo>::new(None));
    let conditions = DataUploadConditions::new(network, None);

    let pipeline = TelemetryPipeline::start(&config, uploader, conditions)
        .await
        .context("starting pipeline")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let message = line.trim();
                    if !message.is_empty() {
                        pipeline.writer().write(&LogEvent::new(message, config.service.as_str()));
                    }
                }
                Ok(None) => {
                    info!("Input closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read input");
                    break;
                }
            },
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
    }

    pipeline.shutdown().await;
    cancel_token.cancel();
    Ok(())
}
