use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use compscan::{
    config::Config,
    detector::all_detectors,
    logging::init_tracing,
    orchestrator::{parse_detector_args, ScanExecutionService},
    output::{print_json, print_result, write_manifest, OutputFormat},
    telemetry::{FileTelemetryService, LoggingTelemetryService, TelemetryRelay, TelemetryService},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
}

#[derive(Parser)]
#[command(name = "compscan")]
#[command(
    author,
    version,
    about = "Detect open-source components in a source tree"
)]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level, e.g. "info" or "compscan=debug" (RUST_LOG wins when set)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (pretty, compact, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a directory for components
    Scan {
        /// Directory to scan
        #[arg(short, long, default_value = ".")]
        source_directory: PathBuf,

        /// Only run detectors in these categories (e.g. Npm,Pip)
        #[arg(long, value_delimiter = ',')]
        detector_categories: Vec<String>,

        /// Only run these detector ids
        #[arg(long, value_delimiter = ',')]
        detectors_filter: Vec<String>,

        /// Detector arguments as Id=Value, e.g. Pip=EnableIfDefaultOff
        #[arg(long, value_delimiter = ',')]
        detector_args: Vec<String>,

        /// Glob patterns of directories to skip
        #[arg(long, value_delimiter = ',')]
        directory_exclusion_list: Vec<String>,

        /// Write the JSON manifest to this file
        #[arg(long)]
        manifest_file: Option<PathBuf>,

        /// Print the JSON manifest to stdout
        #[arg(long)]
        print_manifest: bool,

        /// Output format (table, json)
        #[arg(short, long)]
        format: Option<String>,

        /// Maximum manifests processed concurrently per detector
        #[arg(long)]
        max_threads: Option<usize>,

        /// Time budget for experimental detectors, in seconds
        #[arg(long)]
        experimental_timeout: Option<u64>,
    },

    /// List available detectors
    ListDetectors,

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

struct ScanOptions {
    source_directory: PathBuf,
    detector_categories: Vec<String>,
    detectors_filter: Vec<String>,
    detector_args: Vec<String>,
    directory_exclusion_list: Vec<String>,
    manifest_file: Option<PathBuf>,
    print_manifest: bool,
    format: Option<String>,
    max_threads: Option<usize>,
    experimental_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_default(),
    };

    let log_level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    let log_format = cli.log_format.clone().unwrap_or_else(|| config.log_format.clone());
    init_tracing(&log_level, &log_format)?;

    match cli.command {
        Commands::Scan {
            source_directory,
            detector_categories,
            detectors_filter,
            detector_args,
            directory_exclusion_list,
            manifest_file,
            print_manifest,
            format,
            max_threads,
            experimental_timeout,
        } => {
            run_scan(
                &config,
                ScanOptions {
                    source_directory,
                    detector_categories,
                    detectors_filter,
                    detector_args,
                    directory_exclusion_list,
                    manifest_file,
                    print_manifest,
                    format,
                    max_threads,
                    experimental_timeout,
                },
            )
            .await
        }
        Commands::ListDetectors => {
            list_detectors();
            Ok(exit_codes::SUCCESS)
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

async fn run_scan(config: &Config, options: ScanOptions) -> Result<u8> {
    let format_str = options
        .format
        .unwrap_or_else(|| config.default_format.clone());
    let format = OutputFormat::from_str(&format_str).map_err(|e| anyhow::anyhow!(e))?;
    let is_interactive = format == OutputFormat::Table && !options.print_manifest;

    let source_directory = options
        .source_directory
        .canonicalize()
        .with_context(|| format!("cannot scan {}", options.source_directory.display()))?;

    let mut args = config.detection_arguments(source_directory);
    if !options.detector_categories.is_empty() {
        args.detector_categories = options.detector_categories;
    }
    if !options.detectors_filter.is_empty() {
        args.detectors_filter = options.detectors_filter;
    }
    if !options.directory_exclusion_list.is_empty() {
        args.directory_exclusion_list = options.directory_exclusion_list;
    }
    args.detector_args.extend(parse_detector_args(&options.detector_args)?);
    if let Some(max_threads) = options.max_threads {
        anyhow::ensure!(max_threads > 0, "--max-threads must be at least 1");
        args.max_threads = max_threads;
    }
    if let Some(secs) = options.experimental_timeout {
        args.experimental_timeout = Duration::from_secs(secs);
    }

    let mut services: Vec<Arc<dyn TelemetryService>> = vec![Arc::new(LoggingTelemetryService)];
    if let Some(path) = &config.telemetry_file {
        let service = FileTelemetryService::create(path)
            .with_context(|| format!("cannot open telemetry file {}", path.display()))?;
        services.push(Arc::new(service));
    }
    let (relay, sink) = TelemetryRelay::start(services);

    let progress = if is_interactive {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Scanning {}...", args.source_directory.display()));
        Some(pb)
    } else {
        None
    };

    let service = ScanExecutionService::new(all_detectors(), sink);
    let outcome = service.execute_scan(&args).await;
    drop(service);

    if let Some(pb) = progress {
        match &outcome {
            Ok(result) => pb.finish_with_message(format!(
                "Found {} components",
                result.components_found.len()
            )),
            Err(_) => pb.finish_and_clear(),
        }
    }
    relay.shutdown().await;

    let result = outcome?;

    if let Some(path) = &options.manifest_file {
        write_manifest(&result, path)?;
        if is_interactive {
            println!("Manifest written to: {}", path.display());
        }
    }

    if options.print_manifest {
        print_json(&result)?;
    } else {
        print_result(&result, format)?;
    }

    Ok(result.result_code.exit_code() as u8)
}

fn list_detectors() {
    println!("Available detectors:");
    println!();

    for detector in all_detectors() {
        let categories: Vec<&str> = detector.categories().iter().map(|c| c.as_str()).collect();
        let mut flags = Vec::new();
        if detector.is_experimental() {
            flags.push("experimental");
        }
        if detector.is_default_off() {
            flags.push("default-off");
        }

        println!(
            "  {:<14} v{:<4} {}",
            detector.id(),
            detector.version(),
            categories.join(", ")
        );
        if !flags.is_empty() {
            println!("  {:<14} [{}]", "", flags.join(", "));
        }
    }
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let config = Config::default();
        config.save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    // Show current config
    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'compscan config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}
