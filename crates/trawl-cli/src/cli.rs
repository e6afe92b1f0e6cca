//! Command line arguments.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use trawl_backend::Amount;
use trawl_core::{BackendName, OutputFormat, QualifiedId};

#[derive(Debug, Parser)]
#[command(
    name = "trawl",
    author,
    version,
    about = "Query bank and billing websites through configured backends"
)]
pub struct Cli {
    /// Only use these backends (comma separated)
    #[arg(short = 'b', long = "backends", global = true, value_delimiter = ',')]
    pub backends: Vec<BackendName>,

    /// Output format (defaults to the configured one)
    #[arg(short = 'f', long, global = true, value_enum)]
    pub formatter: Option<Format>,

    /// Print at most N objects
    #[arg(short = 'n', long, global = true, value_name = "N")]
    pub count: Option<usize>,

    /// Never prompt: report pending interactions and exit
    #[arg(long, global = true)]
    pub non_interactive: bool,

    /// Configuration file
    #[arg(long, global = true, env = "TRAWL_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Backends file
    #[arg(long, global = true, env = "TRAWL_BACKENDS_FILE", value_name = "PATH")]
    pub backends_file: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Plain,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Plain => OutputFormat::Plain,
            Format::Json => OutputFormat::Json,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage configured backends
    #[command(subcommand)]
    Backends(BackendsCommand),

    /// List bank accounts
    List,

    /// Past transactions of an account
    History {
        /// Account (id@backend)
        account: QualifiedId,
    },

    /// Upcoming transactions of an account
    Coming {
        /// Account (id@backend)
        account: QualifiedId,
    },

    /// Transfer recipients of an account
    Recipients {
        /// Account (id@backend)
        account: QualifiedId,
    },

    /// Send money from an account to a recipient
    Transfer {
        /// Debited account (id@backend)
        account: QualifiedId,
        /// Recipient id
        recipient: QualifiedId,
        /// Amount, e.g. 12.50
        #[arg(allow_negative_numbers = true)]
        amount: Amount,
        /// Label shown on both statements
        label: Option<String>,
    },

    /// Register a new transfer recipient
    AddRecipient {
        /// Account (id@backend)
        account: QualifiedId,
        iban: String,
        label: String,
    },

    /// Show the profile of the account holder
    Profile,

    /// List subscriptions holding documents
    Subscriptions,

    /// List documents of a subscription
    Documents {
        /// Subscription (id@backend)
        subscription: QualifiedId,
    },

    /// Download a document
    Download {
        /// Document (id@backend)
        document: QualifiedId,
        /// Destination file (defaults to <id>.<format>)
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
pub enum BackendsCommand {
    /// List configured backends
    List,

    /// List available modules
    Modules,

    /// Configure a new backend; missing values are prompted for
    Add {
        name: BackendName,
        module: String,
        /// Configuration values
        #[arg(value_name = "KEY=VALUE", value_parser = parse_key_value)]
        params: Vec<(String, String)>,
    },

    /// Remove a backend and its saved session
    Remove { name: BackendName },

    Enable { name: BackendName },

    Disable { name: BackendName },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}
