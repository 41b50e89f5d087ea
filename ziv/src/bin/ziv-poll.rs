//! ziv-poll: poll a Ziv 5CTM meter from the command line

use anyhow::{Context, bail};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use ziv::MeterConfig;
use ziv::client::{
    IntervalTicks, ManualTicks, MeterPoller, ReadingSink, TickOutcome, shutdown_channel,
};
use ziv::sink::{JsonLinesSink, LogSink};
use ziv::transport::{SerialChannel, SerialSettings};

#[derive(Parser, Debug)]
#[command(name = "ziv-poll", version, about = "Poll a Ziv 5CTM meter over a serial port")]
struct Cli {
    /// Meter configuration (YAML)
    #[arg(short, long, env = "ZIV_CONFIG")]
    config: PathBuf,

    /// Run a single poll cycle and exit
    #[arg(long)]
    once: bool,

    /// Print results as JSON lines on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("ZIV_LOG_LEVEL", "info"))
        .init();
    let cli = Cli::parse();

    let config = MeterConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    config.dump();

    let settings = SerialSettings::from(config.serial());
    let channel = SerialChannel::open(&settings)
        .with_context(|| format!("Failed to open {}", settings.port_name))?;
    let poller = MeterPoller::new(config, channel)?;

    let sink: Box<dyn ReadingSink> = if cli.json {
        Box::new(JsonLinesSink::new(std::io::stdout()))
    } else {
        Box::new(LogSink)
    };

    if cli.once {
        let outcome = poller.tick(sink.as_ref()).await;
        if let TickOutcome::Completed(outcome) = outcome {
            if !outcome.is_empty() && outcome.readings().next().is_none() {
                bail!("No register could be read");
            }
        }
        return Ok(());
    }

    let (handle, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => handle.shutdown(),
            Err(e) => log::error!("Cannot listen for Ctrl-C: {}", e),
        }
    });

    let statistics = match IntervalTicks::from_interval(poller.config().update_interval()) {
        Some(ticks) => poller.run(ticks, sink.as_ref(), shutdown).await,
        None => {
            log::info!("update_interval is never, press Enter to poll");
            let (ticks, trigger) = ManualTicks::new();
            tokio::spawn(async move {
                let mut lines = BufReader::new(tokio::io::stdin()).lines();
                while let Ok(Some(_)) = lines.next_line().await {
                    if !trigger.fire() {
                        log::debug!("Poll already pending");
                    }
                }
            });
            poller.run(ticks, sink.as_ref(), shutdown).await
        }
    };

    log::info!(
        "{} register exchange(s), {} tick(s) dropped",
        statistics.register_exchanges,
        statistics.ticks_dropped
    );
    Ok(())
}
