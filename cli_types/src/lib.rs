use anyhow::{anyhow, bail, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, name = "orion-perf")]
pub struct Cli {
    /// Increase verbosity level (can be specified multiple times.) The first level sets level
    /// "info", second sets level "debug", and third sets level "trace" for the logger.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Additional TOML settings file layered on top of the system configuration
    #[arg(short = 'c', long, global = true)]
    pub config_file: Option<PathBuf>,

    /// Print the tool responses as a JSON array instead of plain text
    #[arg(long, global = true)]
    pub json: bool,

    /// Also write every generated chart into an interactive HTML report
    #[arg(long, global = true)]
    pub html: Option<PathBuf>,

    /// Write decoded chart images into this directory as chart-<n>.png
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Create a versionless command for manpage generation
    pub fn command_without_version() -> clap::Command {
        let mut cmd = Self::command();
        cmd = cmd.version(None::<&str>);
        cmd
    }
}

#[derive(Args)]
pub struct CliWindow {
    /// Version to look into (defaults to the configured default version)
    #[arg(short = 'V', long = "version")]
    pub version: Option<String>,

    #[command(flatten)]
    pub lookback: CliLookback,
}

#[derive(Args)]
pub struct CliLookback {
    /// Number of days to look back, either "15" or "15d"
    #[arg(short, long, value_parser=parse_lookback)]
    pub lookback: Option<u32>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the data source URL handed to orion
    DataSource {},

    /// List the orion configurations available for analysis
    ListConfigs {},

    /// List the metrics every configuration reports
    ListMetrics {},

    /// Render one chart per configuration and metric for a version
    DetailedPerformance {
        #[command(flatten)]
        window: CliWindow,
    },

    /// Check all configurations for changepoints and report the regressed metrics
    HasRegressed {
        #[command(flatten)]
        window: CliWindow,
    },

    /// Overlay one metric across several versions in a single chart
    PerformanceTrend {
        /// Versions to compare, in legend order
        #[arg(short = 'V', long = "version", required = true, action = clap::ArgAction::Append)]
        versions: Vec<String>,

        /// Metric to plot
        #[arg(short, long, value_parser=parse_spaceless_string)]
        metric: String,

        /// Configuration file name, resolved against the configuration directory
        #[arg(short = 'C', long)]
        config: String,

        #[command(flatten)]
        lookback: CliLookback,
    },

    /// Scatter two metrics of one configuration against each other and compute
    /// their Pearson correlation.
    ///
    /// The first metric is placed on the Y-axis, the second on the X-axis.
    MetricsCorrelation {
        /// Metric placed on the Y-axis
        #[arg(long, value_parser=parse_spaceless_string)]
        metric1: String,

        /// Metric placed on the X-axis
        #[arg(long, value_parser=parse_spaceless_string)]
        metric2: String,

        /// Configuration file name, resolved against the configuration directory
        #[arg(short = 'C', long)]
        config: String,

        #[command(flatten)]
        window: CliWindow,
    },

    /// Compare the performance of a pull request against its periodic baseline
    PrPerformance {
        /// GitHub organization owning the repository
        #[arg(long, value_parser=parse_spaceless_string)]
        organization: String,

        /// Repository name
        #[arg(long, value_parser=parse_spaceless_string)]
        repository: String,

        /// Pull request number
        #[arg(long)]
        pull_request: u64,

        /// Configuration file name, resolved against the configuration directory
        #[arg(short = 'C', long)]
        config: String,

        #[command(flatten)]
        window: CliWindow,
    },

    /// Show the effective settings
    Config {},
}

fn parse_spaceless_string(s: &str) -> Result<String> {
    if s.split_whitespace().count() > 1 {
        Err(anyhow!("invalid string/key/value: found space in '{}'", s))
    } else {
        Ok(String::from(s))
    }
}

fn parse_lookback(input: &str) -> Result<u32> {
    let days = input.strip_suffix('d').unwrap_or(input);
    if days.is_empty() {
        bail!("Invalid lookback: expected a number of days such as '15' or '15d'");
    }
    let days: u32 = days
        .parse()
        .map_err(|e| anyhow!("Invalid lookback '{}': {}", input, e))?;
    if days == 0 {
        bail!("Lookback must be at least one day");
    }
    Ok(days)
}
