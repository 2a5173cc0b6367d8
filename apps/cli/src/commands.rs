//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use docframe_core::{
    Interface, PipelineResult, ProgressReporter, TemplateCompute, build_frame, explicit_names,
    run_pipeline,
};
use docframe_frame::{Colspec, DocFrame};
use docframe_io::{JsonRecordsIo, PartitionDesc, PartitionIo};
use docframe_shared::{AppConfig, FrameSettings, init_config, load_config, load_config_from};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// DocFrame: partitioned tables driven by interface descriptions.
#[derive(Parser)]
#[command(
    name = "docframe",
    version,
    about = "Build partitioned tables from interface descriptions, compute columns, save outputs.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.docframe/docframe.toml.
    #[arg(long, global = true, env = "DOCFRAME_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run an interface: load inputs, compute, save outputs.
    Run {
        /// Interface description (TOML).
        #[arg(long)]
        interface: PathBuf,

        /// Directory relative output paths resolve against.
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },

    /// Build a frame from a JSON records file and print it.
    Inspect {
        /// JSON file holding an array of row objects.
        #[arg(long)]
        input: PathBuf,

        /// Column holding the index labels.
        #[arg(long)]
        index: String,

        /// Colspec as JSON, e.g. '{"parameters": ["currency"]}'.
        #[arg(long)]
        colspec: Option<String>,
    },

    /// Print the identifier table an interface's templates can use.
    Names {
        /// Interface description (TOML).
        #[arg(long)]
        interface: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "docframe=info",
        1 => "docframe=debug",
        _ => "docframe=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Run { interface, out_dir } => cmd_run(&config, &interface, out_dir),
        Command::Inspect {
            input,
            index,
            colspec,
        } => cmd_inspect(&config, &input, &index, colspec.as_deref()),
        Command::Names { interface } => cmd_names(&config, &interface),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_run(config: &AppConfig, path: &Path, out_dir: Option<PathBuf>) -> Result<()> {
    let settings = FrameSettings::from(config);
    let mut interface = Interface::load(path)?;
    if let Some(dir) = out_dir.or_else(|| config.defaults.output_dir.clone()) {
        interface = interface.with_output_dir(dir);
    }
    let names = explicit_names(&config.names, &interface.names)?;

    info!(
        interface = %interface.name,
        steps = interface.compute.len(),
        policy = %settings.series_write_policy,
        "running interface"
    );

    let reporter = CliProgress::new();
    let result = run_pipeline(
        &interface,
        &settings,
        &JsonRecordsIo::new().pretty(true),
        &TemplateCompute::new(names),
        &reporter,
    )?;

    // Print summary
    println!();
    println!("  Run complete");
    println!("  Run:     {}", result.run_id);
    println!("  Started: {}", result.started_at.to_rfc3339());
    println!("  Rows:    {}", result.rows);
    println!("  Cells:   {}", result.cells_written);
    for output in &result.outputs {
        println!("  Output:  {}", output.display());
    }
    println!("  Time:    {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

fn cmd_inspect(config: &AppConfig, input: &Path, index: &str, colspec: Option<&str>) -> Result<()> {
    let settings = FrameSettings::from(config);
    let colspec = match colspec {
        Some(json) => Colspec::from_json(json)?,
        None => Colspec::new(),
    };
    let (table, _) = JsonRecordsIo::new().load(&PartitionDesc::new(input).with_index_column(index))?;
    let frame = DocFrame::new(&table, &colspec, &settings)?;

    let flat = frame.to_table().with_index_column(&settings.index_name)?;
    let report = serde_json::json!({
        "colspec": frame.colspec(),
        "logical_rows": frame.len(),
        "parameters": frame
            .parameters()
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>(),
        "rows": JsonRecordsIo::to_records(&flat),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_names(config: &AppConfig, path: &Path) -> Result<()> {
    let settings = FrameSettings::from(config);
    let interface = Interface::load(path)?;
    let names = explicit_names(&config.names, &interface.names)?;
    let frame = build_frame(&interface, &settings, &JsonRecordsIo::new())?;
    let mapper = frame.name_mapper(&names)?;

    let width = mapper
        .iter()
        .map(|(_, m)| m.identifier.len())
        .max()
        .unwrap_or(0);
    for (column, mapping) in mapper.iter() {
        println!(
            "  {:<width$}  {column}  ({:?})",
            mapping.identifier, mapping.origin
        );
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn step(&self, target: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] computing {target}"));
    }

    fn done(&self, result: &PipelineResult) {
        self.spinner.finish_with_message(format!(
            "Done: {} rows, {} outputs",
            result.rows,
            result.outputs.len()
        ));
    }
}
