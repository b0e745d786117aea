use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the soffio-kv binary.
#[derive(Debug, Parser)]
#[command(
    name = "soffio-kv",
    version,
    about = "Namespaced key/value store for Soffio"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SOFFIO_KV_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the administrative HTTP service.
    Serve(Box<ServeArgs>),
    /// Apply pending database migrations.
    Migrate(StoreOverrides),
    /// Print the value stored under a key.
    Get(KeyArgs),
    /// Store a JSON value under a key.
    Set(SetArgs),
    /// Remove a key.
    Delete(KeyArgs),
    /// Remove every key starting with a prefix.
    #[command(name = "delete-prefix")]
    DeletePrefix(PatternArgs),
    /// List entries whose key ends with a suffix.
    Suffix(PatternArgs),
    /// List every entry in a namespace.
    List(NamespaceArgs),
    /// Remove every entry in a namespace.
    Clear(NamespaceArgs),
}

impl Command {
    /// Store overrides shared by every command.
    pub fn store_overrides(&self) -> &StoreOverrides {
        match self {
            Self::Serve(args) => &args.overrides.store,
            Self::Migrate(overrides) => overrides,
            Self::Get(args) | Self::Delete(args) => &args.target.overrides,
            Self::Set(args) => &args.target.overrides,
            Self::DeletePrefix(args) | Self::Suffix(args) => &args.target.overrides,
            Self::List(args) | Self::Clear(args) => &args.overrides,
        }
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct StoreOverrides {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the directory backing object storage.
    #[arg(long = "objects-directory", value_name = "PATH")]
    pub objects_directory: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub store: StoreOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the object key prefix.
    #[arg(long = "objects-prefix", value_name = "PREFIX")]
    pub objects_prefix: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct NamespaceArgs {
    #[command(flatten)]
    pub overrides: StoreOverrides,

    /// Namespace to operate on, e.g. `cache` or `client.config`.
    #[arg(value_name = "NAMESPACE")]
    pub namespace: String,
}

#[derive(Debug, Args, Clone)]
pub struct KeyArgs {
    #[command(flatten)]
    pub target: NamespaceArgs,

    #[arg(value_name = "KEY")]
    pub key: String,
}

#[derive(Debug, Args, Clone)]
pub struct SetArgs {
    #[command(flatten)]
    pub target: NamespaceArgs,

    #[arg(value_name = "KEY")]
    pub key: String,

    /// Value as a JSON document; `'"text"'` for a plain string.
    #[arg(value_name = "JSON")]
    pub value: String,

    /// Stage the write and flush it with a single save.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub deferred: bool,
}

#[derive(Debug, Args, Clone)]
pub struct PatternArgs {
    #[command(flatten)]
    pub target: NamespaceArgs,

    #[arg(value_name = "PATTERN")]
    pub pattern: String,
}
