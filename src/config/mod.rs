//! Deployment configuration.
//!
//! Settings resolve in precedence order: config files first, then
//! `QUADERNO__`-prefixed environment variables, then CLI flags.

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "quaderno";
const ENV_PREFIX: &str = "QUADERNO";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DB_HTTP_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_DB_JOBS_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_MEDIA_DIR: &str = "media";
const DEFAULT_CACHE_ENTRY_LIMIT: usize = 256;
const DEFAULT_CACHE_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Command-line arguments for the Quaderno binary.
#[derive(Debug, Parser)]
#[command(name = "quaderno", version, about = "Quaderno wiki server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "QUADERNO_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the wiki HTTP service and job workers.
    Serve(Box<ServeArgs>),
    /// Export every page to a JSON archive file.
    #[command(name = "export")]
    ExportPages(ExportArgs),
    /// Import pages from a JSON archive file.
    #[command(name = "import")]
    ImportPages(ImportArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Postgres connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Address the HTTP listener binds to.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Port the HTTP listener binds to.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Log level: trace, debug, info, warn or error.
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON instead of compact text.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Postgres connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Connection pool size for request handling.
    #[arg(long = "database-http-max-connections", value_name = "COUNT")]
    pub database_http_max_connections: Option<u32>,

    /// Connection pool size for background jobs.
    #[arg(long = "database-jobs-max-connections", value_name = "COUNT")]
    pub database_jobs_max_connections: Option<u32>,

    /// Public base URL used in feeds and the sitemap.
    #[arg(long = "site-base-url", value_name = "URL")]
    pub site_base_url: Option<String>,

    /// Grant admin rights to an email address; may be repeated.
    #[arg(
        long = "site-admin-email",
        value_name = "EMAIL",
        action = clap::ArgAction::Append
    )]
    pub site_admin_emails: Vec<String>,

    /// Directory uploaded images are stored in.
    #[arg(long = "media-directory", value_name = "PATH")]
    pub media_directory: Option<PathBuf>,

    /// Turn the anonymous-content cache on or off.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Most entries the cache will hold.
    #[arg(long = "cache-entry-limit", value_name = "COUNT")]
    pub cache_entry_limit: Option<usize>,

    /// Largest body the cache will store, in bytes.
    #[arg(long = "cache-max-body-bytes", value_name = "BYTES")]
    pub cache_max_body_bytes: Option<usize>,
}

#[derive(Debug, Args, Clone)]
pub struct ExportArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Archive file to write.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct ImportArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Archive file to read.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Only upsert; never delete pages missing from the archive.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub merge: bool,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub site: SiteSettings,
    pub cache: CacheSettings,
    pub media: MediaSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Compact,
    Json,
}

/// Two pools share one database: requests must never starve because a
/// purge job is holding every connection.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub http_max_connections: NonZeroU32,
    pub jobs_max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    /// Absolute URL of the wiki root, without a trailing slash.
    pub base_url: String,
    /// Addresses that hold admin rights regardless of stored flags.
    pub admin_emails: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub entry_limit: usize,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub directory: PathBuf,
}

/// Why the configuration could not be resolved.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("configuration sources: {0}")]
    Build(#[from] config::ConfigError),
    #[error("`{key}`: {reason}")]
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

/// Resolve settings for the given CLI invocation.
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));
    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }
    let builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.overlay_cli(cli);
    Settings::from_raw(raw)
}

/// Parse the command line and resolve settings against it.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    load(&args).map(|settings| (args, settings))
}

// Raw mirrors of the settings tables. Every field stays optional so each
// layered source can fill only the part it knows about.

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    site: RawSiteSettings,
    cache: RawCacheSettings,
    media: RawMediaSettings,
}

fn overlay<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

impl RawSettings {
    fn overlay_cli(&mut self, cli: &CliArgs) {
        match cli.command.as_ref() {
            Some(Command::Serve(args)) => self.overlay_serve(&args.overrides),
            Some(Command::ExportPages(args)) => self.overlay_database(&args.database),
            Some(Command::ImportPages(args)) => self.overlay_database(&args.database),
            None => {}
        }
    }

    fn overlay_serve(&mut self, flags: &ServeOverrides) {
        overlay(&mut self.server.host, flags.server_host.clone());
        overlay(&mut self.server.port, flags.server_port);
        overlay(&mut self.logging.level, flags.log_level.clone());
        overlay(&mut self.logging.json, flags.log_json);
        overlay(&mut self.database.url, flags.database_url.clone());
        overlay(
            &mut self.database.http_max_connections,
            flags.database_http_max_connections,
        );
        overlay(
            &mut self.database.jobs_max_connections,
            flags.database_jobs_max_connections,
        );
        overlay(&mut self.site.base_url, flags.site_base_url.clone());
        if !flags.site_admin_emails.is_empty() {
            self.site.admin_emails = Some(flags.site_admin_emails.clone());
        }
        overlay(&mut self.media.directory, flags.media_directory.clone());
        overlay(&mut self.cache.enabled, flags.cache_enabled);
        overlay(&mut self.cache.entry_limit, flags.cache_entry_limit);
        overlay(&mut self.cache.max_body_bytes, flags.cache_max_body_bytes);
    }

    fn overlay_database(&mut self, flags: &DatabaseOverride) {
        overlay(&mut self.database.url, flags.database_url.clone());
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let server = build_server_settings(raw.server)?;
        let site = build_site_settings(raw.site, &server)?;
        Ok(Self {
            logging: build_logging_settings(raw.logging)?,
            database: build_database_settings(raw.database)?,
            cache: build_cache_settings(raw.cache),
            media: build_media_settings(raw.media)?,
            server,
            site,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "must be greater than zero",
        ));
    }

    let candidate = format!("{host}:{port}");
    let addr = candidate
        .parse()
        .map_err(|err| LoadError::invalid("server.addr", format!("`{candidate}`: {err}")))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = logging
        .level
        .as_deref()
        .map(LevelFilter::from_str)
        .transpose()
        .map_err(|err| LoadError::invalid("logging.level", err.to_string()))?
        .unwrap_or(LevelFilter::INFO);

    let format = match logging.json {
        Some(true) => LogFormat::Json,
        _ => LogFormat::Compact,
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database
        .url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    Ok(DatabaseSettings {
        url,
        http_max_connections: pool_size(
            database.http_max_connections,
            DEFAULT_DB_HTTP_MAX_CONNECTIONS,
            "database.http_max_connections",
        )?,
        jobs_max_connections: pool_size(
            database.jobs_max_connections,
            DEFAULT_DB_JOBS_MAX_CONNECTIONS,
            "database.jobs_max_connections",
        )?,
    })
}

fn pool_size(
    value: Option<u32>,
    fallback: u32,
    key: &'static str,
) -> Result<NonZeroU32, LoadError> {
    NonZeroU32::new(value.unwrap_or(fallback))
        .ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn build_site_settings(
    site: RawSiteSettings,
    server: &ServerSettings,
) -> Result<SiteSettings, LoadError> {
    let base_url = match site.base_url {
        None => format!("http://{}", server.addr),
        Some(value) => {
            let trimmed = value.trim().trim_end_matches('/');
            if trimmed.is_empty() {
                return Err(LoadError::invalid("site.base_url", "must not be empty"));
            }
            trimmed.to_string()
        }
    };

    let mut admin_emails = Vec::new();
    for email in site.admin_emails.unwrap_or_default() {
        let email = email.trim().to_ascii_lowercase();
        if !email.is_empty() {
            admin_emails.push(email);
        }
    }

    Ok(SiteSettings {
        base_url,
        admin_emails,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> CacheSettings {
    CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        entry_limit: cache.entry_limit.unwrap_or(DEFAULT_CACHE_ENTRY_LIMIT),
        max_body_bytes: cache.max_body_bytes.unwrap_or(DEFAULT_CACHE_MAX_BODY_BYTES),
    }
}

fn build_media_settings(media: RawMediaSettings) -> Result<MediaSettings, LoadError> {
    let directory = media
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MEDIA_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "media.directory",
            "path must not be empty",
        ));
    }

    Ok(MediaSettings { directory })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
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
    http_max_connections: Option<u32>,
    jobs_max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    base_url: Option<String>,
    admin_emails: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    entry_limit: Option<usize>,
    max_body_bytes: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMediaSettings {
    directory: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.overlay_serve(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn base_url_defaults_to_listener_address() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
        assert_eq!(settings.site.base_url, "http://127.0.0.1:8080");
    }

    #[test]
    fn base_url_loses_its_trailing_slash() {
        let mut raw = RawSettings::default();
        raw.site.base_url = Some("https://wiki.example.com/".to_string());
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.site.base_url, "https://wiki.example.com");
    }

    #[test]
    fn admin_emails_are_normalized() {
        let mut raw = RawSettings::default();
        raw.site.admin_emails = Some(vec![
            " Alice@Example.COM ".to_string(),
            String::new(),
            "bob@example.com".to_string(),
        ]);
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(
            settings.site.admin_emails,
            vec!["alice@example.com".to_string(), "bob@example.com".to_string()]
        );
    }

    #[test]
    fn cache_defaults_are_enabled() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
        assert!(settings.cache.enabled);
        assert_eq!(settings.cache.entry_limit, DEFAULT_CACHE_ENTRY_LIMIT);
        assert_eq!(settings.cache.max_body_bytes, DEFAULT_CACHE_MAX_BODY_BYTES);
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(0);
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid { key: "server.port", .. })
        ));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["quaderno"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_export_arguments() {
        let args = CliArgs::parse_from([
            "quaderno",
            "export",
            "--database-url",
            "postgres://example",
            "/tmp/pages.json",
        ]);

        match args.command.expect("export command") {
            Command::ExportPages(export) => {
                assert_eq!(
                    export.database.database_url.as_deref(),
                    Some("postgres://example")
                );
                assert_eq!(export.file, std::path::Path::new("/tmp/pages.json"));
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_import_arguments() {
        let args = CliArgs::parse_from([
            "quaderno",
            "import",
            "--merge",
            "--database-url",
            "postgres://example",
            "/tmp/pages.json",
        ]);

        match args.command.expect("import command") {
            Command::ImportPages(import) => {
                assert_eq!(
                    import.database.database_url.as_deref(),
                    Some("postgres://example")
                );
                assert!(import.merge);
                assert_eq!(import.file, std::path::Path::new("/tmp/pages.json"));
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "quaderno",
            "serve",
            "--server-host",
            "0.0.0.0",
            "--site-admin-email",
            "alice@example.com",
            "--site-admin-email",
            "bob@example.com",
            "--cache-enabled",
            "false",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
                assert_eq!(serve.overrides.site_admin_emails.len(), 2);
                assert_eq!(serve.overrides.cache_enabled, Some(false));
            }
            _ => panic!("wrong command parsed"),
        }
    }
}
