use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use fxalert::core::log::init_logging;
use fxalert::core::{AlertRule, Comparator};
use fxalert::{AppCommand, SimulateTarget};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct SimulateArgs {
    /// Id of a configured alert to replay
    #[arg(short, long, conflicts_with_all = ["base", "quote", "comparator", "threshold"])]
    alert: Option<String>,

    /// Base currency of an ad-hoc rule, e.g. USD
    #[arg(long, requires_all = ["quote", "comparator", "threshold"])]
    base: Option<String>,

    /// Quote currency of an ad-hoc rule, e.g. EUR
    #[arg(long)]
    quote: Option<String>,

    /// greater_than, lower_than or equal
    #[arg(long)]
    comparator: Option<Comparator>,

    #[arg(long)]
    threshold: Option<f64>,

    /// Number of days to replay, ending today
    #[arg(short, long)]
    days: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Evaluate every alert once against the latest rates
    Check,
    /// Evaluate alerts on the configured interval until interrupted
    Watch,
    /// Show configured alerts and their state
    List,
    /// Stop evaluating an alert until subscribed again
    Unsubscribe {
        /// Id of the configured alert
        id: String,

        /// Subscribe the alert again
        #[arg(long)]
        undo: bool,
    },
    /// Replay an alert over past daily rates
    Simulate(SimulateArgs),
}

impl TryFrom<SimulateArgs> for SimulateTarget {
    type Error = anyhow::Error;

    fn try_from(args: SimulateArgs) -> Result<Self> {
        if let Some(id) = args.alert {
            return Ok(SimulateTarget::Alert(id));
        }
        match (args.base, args.quote, args.comparator, args.threshold) {
            (Some(base), Some(quote), Some(comparator), Some(threshold)) => Ok(
                SimulateTarget::Rule(AlertRule::new(&base, &quote, comparator, threshold)),
            ),
            _ => anyhow::bail!(
                "Pass --alert <ID>, or --base, --quote, --comparator and --threshold"
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => fxalert::cli::setup::setup_at_path(path),
            None => fxalert::cli::setup::setup(),
        },
        Some(Commands::Check) => fxalert::run_command(AppCommand::Check, cli.config_path.as_deref()).await,
        Some(Commands::Watch) => fxalert::run_command(AppCommand::Watch, cli.config_path.as_deref()).await,
        Some(Commands::List) => fxalert::run_command(AppCommand::List, cli.config_path.as_deref()).await,
        Some(Commands::Unsubscribe { id, undo }) => {
            fxalert::run_command(AppCommand::Unsubscribe { id, undo }, cli.config_path.as_deref()).await
        }
        Some(Commands::Simulate(args)) => {
            let days = args.days;
            match SimulateTarget::try_from(args) {
                Ok(target) => {
                    fxalert::run_command(
                        AppCommand::Simulate { target, days },
                        cli.config_path.as_deref(),
                    )
                    .await
                }
                Err(e) => Err(e),
            }
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
