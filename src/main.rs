//! tfscan command-line client
//!
//! Starts a scan on the scan server and renders its progress as it arrives,
//! over the event stream when possible and by polling otherwise.

mod cli;

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tfscan_config::Settings;
use tfscan_protocol::{JobId, Percent};
use tfscan_session::{Outcome, ScanController, ScanObserver, SessionOptions};
use tfscan_transport::backend::{Endpoints, HttpTransport};
use tfscan_transport::{ScanTransport, TransportHandle};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, ScanArgs};

const EXIT_FAILED: u8 = 1;
const EXIT_USAGE: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

/// Prints progress lines to stdout.
struct Console;
impl ScanObserver for Console {
    fn on_progress(&mut self, percent: Percent, message: &str) {
        println!("[{:>4}] {message}", percent.to_string());
    }

    fn on_resource(&mut self, percent: Percent, resource_type: &str, resource_count: u64) {
        println!("[{:>4}] found {resource_count} {resource_type}", percent.to_string());
    }

    fn on_completed(&mut self, job_id: &JobId) {
        println!("[{:>4}] scan {job_id} completed", Percent::MAX.to_string());
    }

    fn on_error(&mut self, message: &str) {
        eprintln!("scan failed: {message}");
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn transport(settings: &Settings) -> tfscan_transport::error::Result<HttpTransport> {
    let server = &settings.server;
    let endpoints = Endpoints {
        stream: server.stream_path.clone(),
        start: server.start_path.clone(),
        status: server.status_path.clone(),
    };
    let mut transport = HttpTransport::new("http", &server.base_url, endpoints, server.connect_timeout())?;
    if let Some(timeout) = server.request_timeout() {
        transport = transport.with_request_timeout(timeout);
    }
    if let Some(token) = &server.api_token {
        transport = transport.with_api_token(token);
    }
    Ok(transport)
}

async fn scan(transport: TransportHandle, settings: &Settings, args: &ScanArgs) -> ExitCode {
    let options = SessionOptions {
        poll_interval: settings.polling.interval(),
        streaming: settings.stream.enabled && !args.no_stream,
    };
    let controller = ScanController::new(transport, options);
    let ticket = controller.start_scan(args.to_config(), Console);

    let interrupt = ticket.handle().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling scan");
            interrupt.cancel();
        }
    });

    match ticket.outcome().await {
        Ok(Outcome::Completed { .. }) => ExitCode::SUCCESS,
        Ok(Outcome::Failed { .. }) => ExitCode::from(EXIT_FAILED),
        Ok(Outcome::Cancelled) => {
            eprintln!("scan cancelled");
            ExitCode::from(EXIT_CANCELLED)
        },
        Err(err) => {
            tracing::debug!(error = ?err, "Scan session ended with an error");
            ExitCode::from(EXIT_FAILED)
        },
    }
}

async fn status(transport: TransportHandle, job_id: &JobId) -> ExitCode {
    match transport.status(job_id).await {
        Ok(snapshot) => {
            let message = if snapshot.message.is_empty() { "-" } else { snapshot.message.as_str() };
            println!("{} {} {} {message}", snapshot.job_id, snapshot.status.as_str(), snapshot.percent);
            ExitCode::SUCCESS
        },
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::from(EXIT_FAILED)
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {err:?}");
            return ExitCode::from(EXIT_USAGE);
        },
    };
    let transport: TransportHandle = match transport(&settings) {
        Ok(transport) => Arc::new(transport),
        Err(err) => {
            eprintln!("error: {err:?}");
            return ExitCode::from(EXIT_USAGE);
        },
    };

    match &cli.command {
        Command::Scan(args) => scan(transport, &settings, args).await,
        Command::Status { job_id } => status(transport, job_id).await,
    }
}
