use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "anichat-notify",
    author,
    version,
    about = "Real-time notification client for anichat",
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Backend base URL
    #[arg(long, global = true, env = "ANICHAT_SERVER_URL")]
    pub server: Option<String>,

    /// Push channel URL (defaults to <server>/notifications over ws/wss)
    #[arg(long, global = true, env = "ANICHAT_WS_URL")]
    pub ws_url: Option<String>,

    /// Bearer token
    #[arg(long, global = true, env = "ANICHAT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// File holding the bearer token
    #[arg(long, global = true, env = "ANICHAT_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level or filter directives, e.g. `debug` or `anichat_notify=trace`
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stay connected and print toasts as notifications arrive
    Watch {
        /// Print one JSON object per event
        #[arg(long)]
        json: bool,
    },

    /// Fetch and print recent notifications
    List {
        /// Only unread notifications
        #[arg(long)]
        unread: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Mark every unread notification read
    MarkAllRead {
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
