use std::path::PathBuf;

use clap::{Parser, Subcommand};
use poolkit_deploy::config::CONFIG_FILENAME;
use tracing::level_filters::LevelFilter;

/// Stage selector accepted by `poolkit deploy --tags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Tag {
    All,
    Tokens,
    Pool,
}

#[derive(Parser)]
#[command(name = "poolkit")]
#[command(
    author,
    version,
    about = "Deploy the token set and pool factory, and publish their addresses"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "POOLKIT_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the configuration file. Missing files fall back to defaults
    /// and `POOLKIT_*` environment variables.
    #[arg(short, long, alias = "conf", default_value = CONFIG_FILENAME)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy the selected stages and write their addresses to the registry file.
    Deploy {
        /// Stages to run. The tokens stage rewrites the registry file, the pool
        /// stage appends to it, so `--tags pool` keeps the token addresses.
        #[arg(short, long, value_delimiter = ',', default_value = "all")]
        tags: Vec<Tag>,

        /// Network name, overriding the configured one.
        #[arg(short, long)]
        network: Option<String>,

        /// JSON-RPC endpoint, overriding the configured one.
        #[arg(long, alias = "rpc")]
        rpc_url: Option<String>,
    },

    /// Print the addresses recorded in the registry file.
    Addresses {
        /// Registry file to read instead of the configured one.
        #[arg(long)]
        registry: Option<PathBuf>,
    },

    /// Write the default configuration to the configuration file.
    Init {
        /// Overwrite an existing configuration file.
        #[arg(long)]
        force: bool,
    },
}
