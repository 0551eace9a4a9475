//! flv-push command line

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use flv_push::client::{publish_file, DispatchMode, PublishConfig};
use flv_push::error::{Error, ErrorKind};

/// Publish an FLV file to an RTMP server at real-time pace.
#[derive(Parser, Debug)]
#[command(name = "flv-push", version, about)]
struct Cli {
    /// FLV file to publish.
    input: PathBuf,

    /// Destination, rtmp://host[:port]/app/stream_key.
    #[arg(default_value = "rtmp://localhost/live/inrtmp")]
    url: String,

    /// Dispatch strategy: packet or raw.
    #[arg(long, env = "FLV_PUSH_MODE", default_value_t = DispatchMode::Packet)]
    mode: DispatchMode,

    /// Connect and publish setup timeout in seconds.
    #[arg(long, env = "FLV_PUSH_CONNECT_TIMEOUT", default_value_t = 5)]
    connect_timeout: u64,

    /// Buffer length announced to the server, in milliseconds.
    #[arg(long, env = "FLV_PUSH_BUFFER_MS", default_value_t = 3_600_000)]
    buffer_ms: u32,

    /// Outgoing RTMP chunk size in bytes.
    #[arg(long, env = "FLV_PUSH_CHUNK_SIZE", default_value_t = 4096)]
    chunk_size: u32,
}

impl Cli {
    fn publish_config(&self) -> PublishConfig {
        PublishConfig::new(self.url.clone())
            .mode(self.mode)
            .connect_timeout(Duration::from_secs(self.connect_timeout))
            .buffer_ms(self.buffer_ms)
            .chunk_size(self.chunk_size)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("flv_push=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.publish_config();

    tracing::info!(
        input = %cli.input.display(),
        url = %config.url,
        mode = %config.mode,
        "flv-push starting"
    );

    let code = match publish_file(&cli.input, &config).await {
        Ok(stats) => {
            tracing::info!(
                tags = stats.tags_sent,
                duration_ms = stats.duration.as_millis() as u64,
                "Publish finished"
            );
            0
        }
        Err(Error::EndOfStream) => 0,
        Err(e) => {
            let stage = if e.is_interrupted() { "publish" } else { "setup" };
            match e.kind() {
                ErrorKind::LocalFile => tracing::error!(error = %e, stage, "Local file error"),
                ErrorKind::Connection => tracing::error!(error = %e, stage, "Connection error"),
                ErrorKind::Config => tracing::error!(error = %e, stage, "Invalid configuration"),
                ErrorKind::StreamEnded => tracing::info!(stage, "Stream ended"),
            }
            e.exit_code()
        }
    };

    ExitCode::from(code)
}
