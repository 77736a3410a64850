//! CLI for amqp-json
//!
//! Subcommands:
//! - `consume`: write messages from queues or exchange bindings to stdout
//! - `publish`: send JSON read from stdin to queues or exchanges

use std::path::PathBuf;
use std::time::Duration;

use amqp_json::broker::AmqpBroker;
use amqp_json::config::{Settings, load_config};
use amqp_json::session::{ConsumeOptions, PublishOptions, run_consume, run_publish, shutdown_signals};
use amqp_json::topology::Specification;
use amqp_json::utils::error::AppError;
use amqp_json::utils::logging;
use clap::{Parser, Subcommand};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "amqp-json", version, about = "Move JSON between an AMQP broker and stdio")]
struct Cli {
    /// Configuration file (default: config/default.* in the working directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Broker URL, overrides `broker.url`
    #[arg(long, global = true, env = "AMQP_URL")]
    url: Option<String>,

    /// Log level for stderr output, overrides `logging.level`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consume from queues (`name`) or exchange bindings (`exchange/key[/key...]`)
    Consume {
        /// Fail unless the named queues hold at least this many messages
        #[arg(long)]
        min: Option<u64>,
        /// Stop after this many messages
        #[arg(long)]
        max: Option<u64>,
        /// Indentation of the output array; 0 writes one message per line
        #[arg(long)]
        indent: Option<usize>,
        #[arg(required = true)]
        specs: Vec<String>,
    },
    /// Publish JSON from stdin to queues (`name`) or exchanges (`exchange/key[/key...]`)
    Publish {
        /// Correlation id for messages that do not carry one
        #[arg(long)]
        correlation_id: Option<String>,
        /// Ignore the destination stored in envelope input
        #[arg(long)]
        ignore_metadata: bool,
        /// Route envelope input back to its `queue` instead of its exchange
        #[arg(long)]
        queue_mode: bool,
        specs: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match load_config(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init(cli.log_level.as_deref().unwrap_or("warn"));
            error!("{}", AppError::from(e));
            std::process::exit(1);
        }
    };
    logging::init(cli.log_level.as_deref().unwrap_or(&settings.logging.level));

    if let Err(e) = run(cli, settings).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, settings: Settings) -> Result<(), AppError> {
    let url = cli.url.unwrap_or(settings.broker.url);
    let signals = shutdown_signals()?;

    match cli.command {
        Command::Consume {
            min,
            max,
            indent,
            specs,
        } => {
            let options = ConsumeOptions {
                specification: Specification::parse(&specs),
                min,
                max,
                indent: indent.unwrap_or(settings.consume.indent),
                queue_expiry: Duration::from_millis(settings.consume.queue_expiry_ms),
                ack_flush_delay: Duration::from_millis(settings.consume.ack_flush_delay_ms),
            };
            let stdout = std::io::stdout().lock();
            let report = run_consume(AmqpBroker::connect(&url, false), options, stdout, signals).await?;
            info!(received = report.received, emitted = report.emitted, "Consume finished");
        }
        Command::Publish {
            correlation_id,
            ignore_metadata,
            queue_mode,
            specs,
        } => {
            let options = PublishOptions {
                routes: Specification::parse(&specs).routes(),
                correlation_id: correlation_id.unwrap_or(settings.publish.correlation_id),
                ignore_metadata,
                queue_mode,
            };
            let report =
                run_publish(AmqpBroker::connect(&url, true), options, tokio::io::stdin(), signals).await?;
            info!(
                published = report.published,
                confirmed = report.confirmed,
                skipped = report.skipped,
                "Publish finished"
            );
        }
    }

    Ok(())
}
