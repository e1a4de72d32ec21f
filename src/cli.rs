//! Command-line Arguments

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tfscan_protocol::{JobId, Provider, ScanConfig};

#[derive(Debug, Parser)]
#[command(name = "tfscan", version, about = "Launch and monitor cloud-account scans")]
pub struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "TFSCAN_CONFIG")]
    pub config: Option<PathBuf>,
    /// Increase log verbosity (repeatable); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a scan and follow its progress until it finishes
    Scan(ScanArgs),
    /// Print the current status of a scan job
    Status {
        job_id: JobId,
    },
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Cloud provider to scan
    #[arg(short, long, value_parser = parse_provider)]
    pub provider: Provider,
    /// Credential reference understood by the scan server (never the secret itself)
    #[arg(long = "credentials")]
    pub credential_ref: String,
    /// Restrict the scan to a region (repeatable; default is all regions)
    #[arg(short, long = "region")]
    pub regions: Vec<String>,
    /// Restrict the scan to a resource category (repeatable; default is all)
    #[arg(long = "category")]
    pub categories: Vec<String>,
    /// Only include resources whose name matches
    #[arg(long)]
    pub name_filter: Option<String>,
    /// Skip the event stream and poll the job status instead
    #[arg(long)]
    pub no_stream: bool,
}

impl ScanArgs {
    pub fn to_config(&self) -> ScanConfig {
        let config = ScanConfig::new(self.provider, &self.credential_ref)
            .with_regions(&self.regions)
            .with_categories(&self.categories);
        match &self.name_filter {
            Some(filter) => config.with_name_filter(filter),
            None => config,
        }
    }
}

fn parse_provider(value: &str) -> Result<Provider, String> {
    value.parse().map_err(|err: tfscan_protocol::error::Error| (*err).to_string())
}
