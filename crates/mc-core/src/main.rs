//! Machine collector.
//!
//! Samples an injection-moulding machine at a fixed rate, keeps a continuous
//! low-rate log, records operator-triggered high-rate captures and publishes
//! a live status file.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mc_common::SCHEMA_VERSION;
use mc_config::{AcquisitionConfig, FileCaptureFlag, FileConfigProvider, LayoutOverrides, WorkLayout};
use mc_core::exit_codes::ExitCode;
use mc_core::log_event;
use mc_core::logging::{
    event_names, generate_run_id, get_host_id, init_logging, LogConfig, LogContext, LogFormat,
    Stage,
};
use mc_core::shutdown::install_signal_handler;
use mc_core::{
    connect, AcquisitionLoop, CancellationToken, Endpoint, LoopParts, SampleSource, StatusFormat,
    StatusReporter,
};

/// Machine collector: fixed-rate process data acquisition
#[derive(Parser)]
#[command(name = "mc-collector")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Options shared by every command
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Working directory holding config, flag, status and data directories
    #[arg(long, short = 'C', global = true)]
    workdir: Option<PathBuf>,

    /// Acquisition config file [default: <workdir>/config.txt]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Capture flag file [default: <workdir>/capture]
    #[arg(long, global = true)]
    capture_flag: Option<PathBuf>,

    /// Live status file [default: <workdir>/live_data]
    #[arg(long, global = true)]
    status_file: Option<PathBuf>,

    /// Prediction status file [default: <workdir>/ml_status]
    #[arg(long, global = true)]
    prediction_file: Option<PathBuf>,

    /// Low-rate log directory [default: <workdir>/logs]
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    /// Capture directory [default: <workdir>/train]
    #[arg(long, global = true)]
    train_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    quiet: u8,

    /// Log format on stderr
    #[arg(long, global = true, env = "MC_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

impl GlobalOpts {
    fn layout(&self) -> WorkLayout {
        let overrides = LayoutOverrides {
            config: self.config.clone(),
            capture_flag: self.capture_flag.clone(),
            status: self.status_file.clone(),
            prediction: self.prediction_file.clone(),
            logs_dir: self.logs_dir.clone(),
            train_dir: self.train_dir.clone(),
        };
        WorkLayout::resolve(self.workdir.as_deref(), &overrides)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the acquisition loop (default)
    Run(RunArgs),
    /// Validate the config file and print the effective settings
    Check(CheckArgs),
    /// Config file helpers
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Print version information
    Version,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Sample source: sim://[seed], replay:<path> or opc.tcp://host:port/path
    #[arg(long, short = 'e', env = "MC_ENDPOINT", default_value = "sim://")]
    endpoint: String,

    /// Status file format
    #[arg(long, value_enum, env = "MC_STATUS_FORMAT", default_value_t = StatusFormat::Text)]
    status_format: StatusFormat,

    /// Machine identifier attached to log events
    #[arg(long, env = "MC_MACHINE_ID")]
    machine_id: Option<String>,

    /// Stop after this many ticks
    #[arg(long)]
    max_ticks: Option<u64>,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Print the result as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the default config file to stdout
    Default,
}

fn main() {
    let cli = Cli::parse();

    let base = LogConfig::from_env(None, cli.global.log_format);
    let level = base.level.adjusted(cli.global.verbose, cli.global.quiet);
    init_logging(&base.with_level(level));

    let exit_code = match cli.command {
        None => run_collector(&cli.global, &RunArgs::default_from_env()),
        Some(Commands::Run(args)) => run_collector(&cli.global, &args),
        Some(Commands::Check(args)) => run_check(&cli.global, &args),
        Some(Commands::Config(cmd)) => run_config(&cli.global, &cmd),
        Some(Commands::Version) => {
            println!("mc-collector {} (schema {})", env!("CARGO_PKG_VERSION"), SCHEMA_VERSION);
            ExitCode::Clean
        }
    };

    std::process::exit(exit_code.as_i32());
}

impl RunArgs {
    /// `run` defaults for a bare invocation, honouring the same env vars.
    fn default_from_env() -> Self {
        let mut args = RunArgs {
            endpoint: std::env::var("MC_ENDPOINT").unwrap_or_else(|_| "sim://".to_string()),
            machine_id: std::env::var("MC_MACHINE_ID").ok(),
            ..RunArgs::default()
        };
        if let Ok(format) = std::env::var("MC_STATUS_FORMAT") {
            if let Ok(format) = <StatusFormat as clap::ValueEnum>::from_str(&format, true) {
                args.status_format = format;
            }
        }
        args
    }
}

fn run_collector(global: &GlobalOpts, args: &RunArgs) -> ExitCode {
    let mut ctx = LogContext::new(generate_run_id(), get_host_id());
    if let Some(machine_id) = &args.machine_id {
        ctx = ctx.with_machine_id(machine_id.clone());
    }
    let _span = tracing::info_span!(
        "collector",
        run_id = %ctx.run_id,
        machine_id = ctx.machine_id.as_deref()
    )
    .entered();
    let layout = global.layout();

    if let Err(e) = layout.ensure_dirs() {
        log_event!(
            ctx,
            ERROR,
            event_names::WRITE_FAILED,
            Stage::Init,
            "cannot create data directories",
            logs_dir = %layout.logs_dir.display(),
            train_dir = %layout.train_dir.display(),
            error = %e
        );
        return ExitCode::StorageError;
    }

    let provider = FileConfigProvider::new(&layout.config);
    let config = match provider.load_initial() {
        Ok(config) => config,
        Err(e) => {
            log_event!(
                ctx,
                ERROR,
                event_names::CONFIG_RELOAD_FAILED,
                Stage::Init,
                "config file missing or invalid",
                path = %layout.config.display(),
                error = %e
            );
            return ExitCode::ConfigError;
        }
    };
    log_event!(
        ctx,
        INFO,
        event_names::CONFIG_LOADED,
        Stage::Init,
        "config loaded",
        path = %layout.config.display(),
        hi_rate_hz = config.hi_rate_hz,
        lo_rate_hz = config.lo_rate_hz,
        max_log_file_kb = config.max_log_file_kb
    );
    if !config.is_exact_decimation() {
        log_event!(
            ctx,
            WARN,
            event_names::CONFIG_LOADED,
            Stage::Init,
            "low rate does not divide high rate; low-rate log is approximate",
            decimation_factor = config.decimation_factor()
        );
    }

    let source = match args.endpoint.parse::<Endpoint>().and_then(|ep| connect(&ep)) {
        Ok(source) => source,
        Err(e) => {
            log_event!(
                ctx,
                ERROR,
                event_names::SOURCE_CONNECTED,
                Stage::Init,
                "cannot connect to sample source",
                endpoint = %args.endpoint,
                error = %e
            );
            return ExitCode::SourceError;
        }
    };
    log_event!(
        ctx,
        INFO,
        event_names::SOURCE_CONNECTED,
        Stage::Init,
        "sample source connected",
        source = %source.describe()
    );

    let token = CancellationToken::new();
    if let Err(e) = install_signal_handler(&token) {
        eprintln!("mc-collector: cannot install signal handler: {}", e);
        return ExitCode::InternalError;
    }

    let reporter = StatusReporter::new(&layout.status, &layout.logs_dir, &layout.train_dir)
        .with_prediction_file(&layout.prediction)
        .with_format(args.status_format);

    let parts = LoopParts {
        config,
        provider: Box::new(provider),
        flag: Box::new(FileCaptureFlag::new(&layout.capture_flag)),
        source,
        reporter,
        logs_dir: layout.logs_dir.clone(),
        train_dir: layout.train_dir.clone(),
    };

    let acquisition = match AcquisitionLoop::start(parts, ctx.clone()) {
        Ok(acquisition) => acquisition.with_tick_limit(args.max_ticks),
        Err(e) => {
            log_event!(
                ctx,
                ERROR,
                event_names::WRITE_FAILED,
                Stage::Init,
                "cannot open the first low-rate log file",
                logs_dir = %layout.logs_dir.display(),
                error = %e
            );
            return e.exit_code();
        }
    };

    match acquisition.run(&token) {
        Ok(_) => ExitCode::Clean,
        Err(e) => e.exit_code(),
    }
}

fn run_check(global: &GlobalOpts, args: &CheckArgs) -> ExitCode {
    let layout = global.layout();
    let result = AcquisitionConfig::load(&layout.config);

    if args.json {
        let body = match &result {
            Ok(config) => serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "valid": true,
                "path": layout.config,
                "config": config,
                "decimation_factor": config.decimation_factor(),
                "exact_decimation": config.is_exact_decimation(),
                "tick_period_us": config.tick_period().as_micros() as u64,
                "layout": layout,
            }),
            Err(e) => serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "valid": false,
                "path": layout.config,
                "error": e.to_string(),
                "error_code": e.code(),
            }),
        };
        match serde_json::to_string_pretty(&body) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("mc-collector: failed to encode result: {}", e);
                return ExitCode::InternalError;
            }
        }
    } else {
        match &result {
            Ok(config) => {
                println!("config: {} (valid)", layout.config.display());
                println!("  hi_rate_hz:        {}", config.hi_rate_hz);
                println!("  lo_rate_hz:        {}", config.lo_rate_hz);
                println!(
                    "  decimation:        every {} tick(s){}",
                    config.decimation_factor(),
                    if config.is_exact_decimation() { "" } else { " (approximate)" }
                );
                println!("  max_log_file_kb:   {}", config.max_log_file_kb);
                println!("  max_log_dir_kb:    {}", config.max_log_dir_kb);
                println!("  max_train_dir_kb:  {}", config.max_train_dir_kb);
                println!("  logs dir:          {}", layout.logs_dir.display());
                println!("  train dir:         {}", layout.train_dir.display());
                println!("  capture flag:      {}", layout.capture_flag.display());
                println!("  status file:       {}", layout.status.display());
            }
            Err(e) => eprintln!("config: {}: {}", layout.config.display(), e),
        }
    }

    match result {
        Ok(_) => ExitCode::Clean,
        Err(_) => ExitCode::ConfigError,
    }
}

fn run_config(global: &GlobalOpts, cmd: &ConfigCommands) -> ExitCode {
    let rendered = AcquisitionConfig::default().render();
    match cmd {
        ConfigCommands::Default => {
            print!("{}", rendered);
            ExitCode::Clean
        }
        ConfigCommands::Init { force } => {
            let layout = global.layout();
            if layout.config.exists() && !force {
                eprintln!(
                    "mc-collector: {} already exists (use --force to overwrite)",
                    layout.config.display()
                );
                return ExitCode::ConfigError;
            }
            if let Some(parent) = layout.config.parent().filter(|p| !p.as_os_str().is_empty()) {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    eprintln!("mc-collector: cannot create {}: {}", parent.display(), e);
                    return ExitCode::ConfigError;
                }
            }
            match std::fs::write(&layout.config, rendered) {
                Ok(()) => {
                    println!("wrote {}", layout.config.display());
                    ExitCode::Clean
                }
                Err(e) => {
                    eprintln!("mc-collector: cannot write {}: {}", layout.config.display(), e);
                    ExitCode::ConfigError
                }
            }
        }
    }
}
