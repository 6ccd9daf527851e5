//! agora-broadcast — publish one message into the overlay and exit
//!
//! Prints the message id (or an empty line when publishing failed) on stdout.
//! Exit status is 1 when the node cannot be created or started, when the
//! content topic is invalid, or when publishing failed under `--fail-on-publish-error`.

use agora_broadcast::config::{PublishFailurePolicy, PublisherConfig};
use agora_broadcast::{logging, Context, PayloadSource, Publisher};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "agora-broadcast", version, about = "Push one message into the Agora overlay")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "AGORA_BROADCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Deployment environment tag for log lines
    #[arg(long)]
    env: Option<String>,

    /// Inline text payload
    #[arg(long, conflicts_with_all = ["payload_file", "proof"])]
    payload: Option<String>,

    /// Read the payload from a file
    #[arg(long, conflicts_with = "proof")]
    payload_file: Option<PathBuf>,

    /// Publish a proof wrapped in the Proof protobuf message
    #[arg(long)]
    proof: Option<String>,

    /// Function tag of the content topic (e.g. proof, create-comment)
    #[arg(long)]
    function: Option<String>,

    /// Service peer multiaddr ending in /p2p/<peer-id>; repeatable
    #[arg(long = "bootstrap")]
    bootstrap: Vec<String>,

    /// TCP port to listen on (0 = random)
    #[arg(long)]
    port: Option<u16>,

    /// Overall deadline in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Exit with status 1 when the publish step fails
    #[arg(long)]
    fail_on_publish_error: bool,
}

impl Cli {
    fn apply(self, mut config: PublisherConfig) -> PublisherConfig {
        if let Some(env) = self.env {
            config.env = env;
        }
        if let Some(text) = self.payload {
            config.payload = PayloadSource::Text(text);
        }
        if let Some(path) = self.payload_file {
            config.payload = PayloadSource::File(path);
        }
        if let Some(proof) = self.proof {
            config.payload = PayloadSource::Proof(proof);
        }
        if let Some(function) = self.function {
            config.topic.function = function;
        }
        if !self.bootstrap.is_empty() {
            config.node.bootstrap = self.bootstrap;
        }
        if let Some(port) = self.port {
            config.node.listen_port = port;
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout_secs = secs;
        }
        if self.fail_on_publish_error {
            config.on_publish_error = PublishFailurePolicy::Fail;
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match PublisherConfig::load(cli.config.as_deref()) {
        Ok(config) => cli.apply(config),
        Err(e) => {
            let defaults = PublisherConfig::default();
            logging::init(&defaults.app, &defaults.env);
            error!(err:% = e; "Exiting: error while loading configuration");
            return ExitCode::from(1);
        }
    };
    logging::init(&config.app, &config.env);

    let publisher = match Publisher::new(config) {
        Ok(publisher) => publisher,
        Err(e) => {
            error!(err:% = e; "Exiting: invalid configuration");
            return ExitCode::from(1);
        }
    };

    let ctx = Context::with_timeout(publisher.config().timeout());
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            interrupt.cancel();
        }
    });

    match publisher.run(&ctx).await {
        Ok(outcome) => {
            println!("{}", outcome.report_line());
            ExitCode::from(outcome.exit_code())
        }
        Err(e) => ExitCode::from(e.exit_code()),
    }
}
