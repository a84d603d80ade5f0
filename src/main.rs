use clap::{ArgAction, Parser};
use log::info;
use std::path::{Path, PathBuf};
use std::process::exit;

use sanchecker::config::{Config, ConfigError, PrometheusConfig};

mod metrics;
mod output;

use output::OutputFormat;

const DEFAULT_CONFIG_FILE: &str = "sanchecker.toml";

/// Probe the Subject Alternative Names of a TLS certificate and report which
/// of them serve the same certificate.
#[derive(Parser, Debug)]
#[command(name = "sanchecker", version, author, about, long_about = None)]
struct Args {
    /// Source host: hostname, IP address, host:port or URL
    host: Option<String>,

    /// TCP port of the source host [default: 443]
    #[arg(short, long)]
    port: Option<u16>,

    /// Ports to try on every SAN hostname, comma separated [default: 443]
    #[arg(short = 't', long, value_delimiter = ',')]
    try_ports: Option<Vec<u16>>,

    /// Connection timeout in milliseconds [default: 1000]
    #[arg(long)]
    timeout: Option<u64>,

    /// Number of SAN probes to run at once [default: 1]
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// SAN extraction mode: dns, legacy [default: dns]
    #[arg(long)]
    san_mode: Option<String>,

    /// Output format: text, json, summary [default: text]
    #[arg(short, long)]
    output: Option<String>,

    /// Exit code when a SAN host presents a different certificate [default: 0]
    #[arg(long)]
    exit_code: Option<i32>,

    /// Push results to a Prometheus Push Gateway
    #[arg(long)]
    prometheus: bool,

    /// Prometheus Push Gateway address [default: http://localhost:9091]
    #[arg(long)]
    prometheus_address: Option<String>,

    /// Configuration file [default: ./sanchecker.toml if present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print an example configuration file and exit
    #[arg(long)]
    generate_config: bool,

    /// Log progress (-v) or every failed probe (-vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn to_config(&self) -> Config {
        Config {
            host: self.host.clone(),
            port: self.port,
            try_ports: self.try_ports.clone(),
            timeout_ms: self.timeout,
            concurrency: self.concurrency,
            san_mode: self.san_mode.clone(),
            output: self.output.clone(),
            exit_code: self.exit_code,
            prometheus: Some(PrometheusConfig {
                enabled: if self.prometheus { Some(true) } else { None },
                address: self.prometheus_address.clone(),
            }),
        }
    }
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::init_from_env(env_logger::Env::default().filter_or("RUST_LOG", level));
}

fn load_config(args: &Args) -> Result<Config, ConfigError> {
    let file_config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Config::from_file(DEFAULT_CONFIG_FILE)?,
        None => Config::default(),
    };

    Ok(Config::defaults()
        .merge_with(file_config)
        .merge_with(args.to_config()))
}

fn main() {
    let args = Args::parse();
    init_logger(args.verbose);

    if args.generate_config {
        println!("{}", Config::example_toml());
        exit(0);
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            exit(1);
        }
    };

    let (probe_config, format) = match config.resolve().and_then(|probe_config| {
        let format = config
            .output
            .as_deref()
            .unwrap_or("text")
            .parse::<OutputFormat>()
            .map_err(|_| ConfigError::Validation("output must be text, json or summary".to_string()))?;
        Ok((probe_config, format))
    }) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("{}", e);
            exit(1);
        }
    };

    let trace = match sanchecker::trace(&probe_config) {
        Ok(trace) => trace,
        Err(e) => {
            eprintln!("{}", e);
            exit(1);
        }
    };

    println!("{}", output::render(&trace, format));

    if let Some(PrometheusConfig {
        enabled: Some(true),
        address,
    }) = &config.prometheus
    {
        let address = address.as_deref().unwrap_or("http://localhost:9091");
        info!("Pushing {} results to {}", trace.results.len(), address);
        metrics::prom::prometheus_metrics(&trace, address);
    }

    if trace.mismatches().next().is_some() {
        exit(config.exit_code.unwrap_or(0));
    }
    exit(0);
}
