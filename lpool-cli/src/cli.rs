use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "lpool",
    author,
    version,
    about = "Read the latest water test from a Leslie's Pool account",
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Account email address
    #[arg(long, env = "LESLIES_USERNAME", global = true)]
    pub username: Option<String>,

    /// Account password
    #[arg(long, env = "LESLIES_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Pool profile identifier from the water test page
    #[arg(long, env = "LESLIES_POOL_PROFILE_ID", global = true)]
    pub pool_profile_id: Option<String>,

    /// Pool display name
    #[arg(long, env = "LESLIES_POOL_NAME", global = true)]
    pub pool_name: Option<String>,

    /// Seconds between polls
    #[arg(long, env = "LESLIES_SCAN_INTERVAL", global = true)]
    pub scan_interval: Option<u64>,

    /// Request timeout in seconds (0 disables it)
    #[arg(short, long, global = true)]
    pub timeout: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch the most recent water test once
    Fetch {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
        output: OutputFormat,
    },

    /// Poll on the configured interval and print every update
    Poll {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
        output: OutputFormat,

        /// Stop after this many updates
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        count: Option<u64>,
    },

    /// Show or reset the configuration file
    Config {
        /// Print the current configuration
        #[arg(long)]
        show: bool,

        /// Reset the configuration file to defaults
        #[arg(long, conflicts_with = "show")]
        reset: bool,
    },
}

impl Commands {
    pub fn output_format(&self) -> Option<OutputFormat> {
        match self {
            Commands::Fetch { output } | Commands::Poll { output, .. } => Some(*output),
            Commands::Config { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Pretty,
    /// Pretty-printed JSON
    Json,
    /// Single-line JSON
    JsonCompact,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::JsonCompact)
    }
}
