mod mode;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
pub use mode::Mode;
use std::path::PathBuf;

/// Compile log filter expressions into log processor pipeline stages
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Compiler configuration file (TOML)
    #[arg(short, long, global = true, env = "LOG_FILTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'F', long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// When to use colors
    #[arg(long, global = true, value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,

    /// Also write the output to this file
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse filters and print their canonical form
    Check {
        /// Filter expressions
        #[arg(required = true, allow_hyphen_values = true)]
        filters: Vec<String>,
    },
    /// Print the canonical form of a filter
    Fmt {
        /// Filter expression
        #[arg(allow_hyphen_values = true)]
        filter: String,

        /// Fail and show a diff when the filter is not already canonical
        #[arg(long)]
        check: bool,
    },
    /// Lower filters into pipeline stages for one tag
    Lower {
        /// Filter expressions; a record is selected when any of them matches
        #[arg(required = true, allow_hyphen_values = true)]
        filters: Vec<String>,

        /// Tag of the records the stages apply to
        #[arg(short, long)]
        tag: String,

        /// Keep or drop the selected records
        #[arg(short, long, value_enum, default_value_t = Mode::Include)]
        mode: Mode,
    },
    /// Show the record fields that field references resolve to
    Members {
        /// Field references, e.g. jsonPayload.foo or labels."a.b/c"
        #[arg(required = true)]
        fields: Vec<String>,

        /// Also show the Lua read and write accessors used by script-based processors
        #[arg(long)]
        lua: bool,
    },
    /// Run filters against a JSON (or JSON5) record
    Eval {
        /// Filter expressions; the record is selected when any of them matches
        #[arg(required = true, allow_hyphen_values = true)]
        filters: Vec<String>,

        /// File holding one JSON object
        #[arg(short, long)]
        record: PathBuf,

        /// Keep or drop the selected records
        #[arg(short, long, value_enum, default_value_t = Mode::Include)]
        mode: Mode,
    },
    /// Compile every pipeline of the configuration file
    Compile,
}

pub fn cli_parse() -> Cli {
    Cli::parse()
}
