//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{
    CliArgs, Command, KeyArgs, NamespaceArgs, PatternArgs, ServeArgs, ServeOverrides, SetArgs,
    StoreOverrides,
};

use std::{
    collections::HashSet, net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::{BackendKind, Namespace, NamespaceBinding};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "soffio-kv";
const ENV_PREFIX: &str = "SOFFIO_KV";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3100;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_OBJECTS_DIR: &str = "objects";
const DEFAULT_OBJECTS_PREFIX: &str = "kv";
pub(crate) const DEFAULT_SENSITIVE_FIELDS: &[&str] = &[
    "ai.api_key",
    "oauth.client_secret",
    "storage.secret_access_key",
];

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub objects: ObjectSettings,
    pub namespaces: Vec<NamespaceBinding>,
    pub admin: AdminSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct ObjectSettings {
    pub directory: PathBuf,
    /// Leading path segment of every namespace object key.
    pub prefix: String,
}

#[derive(Debug, Clone)]
pub struct AdminSettings {
    /// Configuration keys whose values are masked before leaving the service.
    pub sensitive_fields: Vec<String>,
    /// The only namespace the "clear cache" action touches.
    pub cache_namespace: Namespace,
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            sensitive_fields: DEFAULT_SENSITIVE_FIELDS
                .iter()
                .map(|field| field.to_string())
                .collect(),
            cache_namespace: Namespace::cache(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(command) => raw.apply_store_overrides(command.store_overrides()),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    objects: RawObjectSettings,
    namespaces: Option<Vec<RawNamespaceBinding>>,
    admin: RawAdminSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_store_overrides(&overrides.store);

        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(prefix) = overrides.objects_prefix.as_ref() {
            self.objects.prefix = Some(prefix.clone());
        }
    }

    fn apply_store_overrides(&mut self, overrides: &StoreOverrides) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(directory) = overrides.objects_directory.as_ref() {
            self.objects.directory = Some(directory.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            objects,
            namespaces,
            admin,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let objects = build_object_settings(objects)?;
        let namespaces = build_namespace_bindings(namespaces)?;
        let admin = build_admin_settings(admin, &namespaces)?;

        Ok(Self {
            server,
            logging,
            database,
            objects,
            namespaces,
            admin,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_value = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = non_zero_u32(max_value.into(), "database.max_connections")?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_object_settings(objects: RawObjectSettings) -> Result<ObjectSettings, LoadError> {
    let directory = objects
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OBJECTS_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "objects.directory",
            "directory must not be empty",
        ));
    }

    let prefix = objects
        .prefix
        .unwrap_or_else(|| DEFAULT_OBJECTS_PREFIX.to_string());
    let prefix = prefix.trim_matches('/').to_string();
    if prefix.is_empty() {
        return Err(LoadError::invalid("objects.prefix", "prefix must not be empty"));
    }
    if prefix.split('/').any(|segment| segment.is_empty() || segment == "..") {
        return Err(LoadError::invalid(
            "objects.prefix",
            format!("`{prefix}` is not a relative object path"),
        ));
    }

    Ok(ObjectSettings { directory, prefix })
}

fn build_namespace_bindings(
    namespaces: Option<Vec<RawNamespaceBinding>>,
) -> Result<Vec<NamespaceBinding>, LoadError> {
    let Some(raw) = namespaces else {
        return Ok(NamespaceBinding::defaults());
    };
    if raw.is_empty() {
        return Err(LoadError::invalid(
            "namespaces",
            "at least one namespace must be configured",
        ));
    }

    let mut seen = HashSet::new();
    let mut bindings = Vec::with_capacity(raw.len());
    for entry in raw {
        let name = entry
            .name
            .ok_or_else(|| LoadError::invalid("namespaces.name", "every namespace needs a name"))?;
        let namespace =
            Namespace::new(name).map_err(|err| LoadError::invalid("namespaces.name", err.to_string()))?;

        let backend = match entry.backend {
            Some(value) => BackendKind::from_str(value.trim())
                .map_err(|reason| LoadError::invalid("namespaces.backend", reason))?,
            None => BackendKind::Relational,
        };

        let binding = NamespaceBinding::new(namespace, backend, entry.secret.unwrap_or(false));
        binding
            .validate()
            .map_err(|err| LoadError::invalid("namespaces.backend", err.to_string()))?;

        if !seen.insert(binding.namespace.clone()) {
            return Err(LoadError::invalid(
                "namespaces.name",
                format!("namespace `{}` is configured more than once", binding.namespace),
            ));
        }
        bindings.push(binding);
    }

    Ok(bindings)
}

fn build_admin_settings(
    admin: RawAdminSettings,
    bindings: &[NamespaceBinding],
) -> Result<AdminSettings, LoadError> {
    let defaults = AdminSettings::default();

    let sensitive_fields = match admin.sensitive_fields {
        Some(fields) => {
            let mut cleaned = Vec::with_capacity(fields.len());
            for field in fields {
                let trimmed = field.trim();
                if trimmed.is_empty() {
                    return Err(LoadError::invalid(
                        "admin.sensitive_fields",
                        "field names must not be empty",
                    ));
                }
                cleaned.push(trimmed.to_string());
            }
            cleaned
        }
        None => defaults.sensitive_fields,
    };

    let cache_namespace = match admin.cache_namespace {
        Some(name) => Namespace::new(name)
            .map_err(|err| LoadError::invalid("admin.cache_namespace", err.to_string()))?,
        None => defaults.cache_namespace,
    };
    match bindings
        .iter()
        .find(|binding| binding.namespace == cache_namespace)
    {
        None => {
            return Err(LoadError::invalid(
                "admin.cache_namespace",
                format!("namespace `{cache_namespace}` is not configured"),
            ));
        }
        Some(binding) if binding.secret => {
            return Err(LoadError::invalid(
                "admin.cache_namespace",
                format!("namespace `{cache_namespace}` holds secrets and cannot be cleared"),
            ));
        }
        Some(_) => {}
    }

    Ok(AdminSettings {
        sensitive_fields,
        cache_namespace,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawObjectSettings {
    directory: Option<PathBuf>,
    prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawNamespaceBinding {
    name: Option<String>,
    backend: Option<String>,
    secret: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAdminSettings {
    sensitive_fields: Option<Vec<String>>,
    cache_namespace: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests;
