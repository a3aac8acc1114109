mod assets;
mod collectors;
mod config;
mod http;
mod metrics;
mod snapshot;

use axum::serve;
use clap::Parser;
use collectors::thermal::{CommandFanSpeed, CommandTemperature};
use collectors::Sampler;
use config::{Config, PORT_ENV};
use metrics::Metrics;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const LONG_FLAGS: [&str; 3] = ["port", "config", "print-default-config"];

#[derive(Parser, Debug)]
#[command(name = "sysdash")]
#[command(version)]
struct Cli {
    /// Port to listen on (default 3000). PORT overrides it.
    #[arg(long, allow_negative_numbers = true)]
    port: Option<i64>,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    print_default_config: bool,
}

impl Cli {
    /// Accepts `-port 8080` and `-port=8080` alongside the `--` forms.
    fn parse_normalized() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }
}

fn normalize_args<I: IntoIterator<Item = OsString>>(args: I) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| {
            let Some(s) = arg.to_str() else {
                return arg;
            };
            let Some(rest) = s.strip_prefix('-').filter(|r| !r.starts_with('-')) else {
                return arg;
            };
            let name = rest.split_once('=').map_or(rest, |(name, _)| name);
            if LONG_FLAGS.contains(&name) {
                OsString::from(format!("-{s}"))
            } else {
                arg
            }
        })
        .collect()
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse_normalized();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match &cli.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(error = %err, "failed to load configuration");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    let requested = cli.port.unwrap_or(cfg.port);
    let env_port = std::env::var(PORT_ENV).ok();
    let choice = config::resolve_port(requested, env_port.as_deref());
    if let Some(bad) = choice.rejected {
        warn!(
            port = bad,
            default = config::DEFAULT_PORT,
            "invalid port number, using default"
        );
    }

    let bundle = match assets::bundle() {
        Ok(bundle) => bundle,
        Err(err) => {
            error!(error = %err, "failed to load embedded static files");
            std::process::exit(1);
        }
    };

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "failed to initialise metrics registry");
            std::process::exit(1);
        }
    };

    let sampler = Sampler::new(
        Arc::new(CommandTemperature::new(&cfg.temperature_command)),
        Arc::new(CommandFanSpeed::new(
            &cfg.fan_command,
            cfg.fan_sysfs_paths.clone(),
        )),
    );

    let addr = match cfg.listen_addr(choice.port) {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, "invalid listen address");
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(err) => {
            error!(error = %err, %addr, "failed to start server");
            std::process::exit(1);
        }
    };
    info!(%addr, assets = bundle.len(), "server starting on http://{addr}");

    let app = http::build_router(Arc::new(sampler), metrics, bundle);
    let server = serve(listener, app).with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
        }
        info!("received Ctrl+C, shutting down");
    });

    if let Err(err) = server.await {
        error!(error = %err, "HTTP server error");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
