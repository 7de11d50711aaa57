//! Pipeline configuration management
//!
//! Handles loading configuration from a TOML file, environment variables and
//! CLI arguments, then validates it before anything runs.

use crate::notify::{NotifierSettings, SmtpSettings, DEFAULT_SUBJECT};
use crate::schedule::DailySchedule;
use adapter_finlife::endpoint::{BANK_GROUP, FINLIFE_BASE_URL};
use adapter_finlife::{FinlifeSettings, GatePolicy};
use infra_store::postgres::is_sql_identifier;
use infra_store::StoreSettings;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required values are absent
    #[error("Missing required configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    /// A value is present but unusable
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field or variable
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// Invalid log level
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// The configuration file could not be read or parsed
    #[error("Configuration file error: {0}")]
    FileError(String),
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// A credential whose value never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The wrapped value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Log levels supported by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// trace
    Trace,
    /// debug
    Debug,
    /// info
    #[default]
    Info,
    /// warn
    Warn,
    /// error
    Error,
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ConfigError::InvalidLogLevel(s.to_string())),
        }
    }
}

impl LogLevel {
    /// Convert log level to tracing filter string
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_filter_str())
    }
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    LogLevel::from_str(&s).map_err(serde::de::Error::custom)
}

/// Pipeline configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rate API key
    pub api_key: Option<Secret>,
    /// Rate API base URL
    pub api_base_url: String,
    /// Institution groups to fetch
    pub fin_groups: Vec<String>,
    /// Store connection URL
    pub database_url: Option<Secret>,
    /// Products table
    pub products_table: String,
    /// Subscribers table
    pub subscribers_table: String,
    /// Comparison procedure
    pub comparison_procedure: String,
    /// SMTP relay host
    pub smtp_host: Option<String>,
    /// SMTP relay port
    pub smtp_port: u16,
    /// SMTP login user
    pub smtp_user: Option<String>,
    /// SMTP login password
    pub smtp_password: Option<Secret>,
    /// Sender address; defaults to the SMTP user
    pub smtp_from: Option<String>,
    /// Subject line of result emails
    pub email_subject: String,
    /// Link appended to result emails
    pub detail_url: Option<String>,
    /// Gate timeout in seconds
    pub gate_timeout_secs: u64,
    /// Gate poke interval in seconds
    pub gate_poke_interval_secs: u64,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
    /// Log level
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    /// Run lock file
    pub lock_file: PathBuf,
    /// Daily trigger time, `HH:MM`
    pub schedule_time: String,
    /// UTC offset of the trigger time and of the collection date, `+HH:MM`
    pub schedule_offset: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: FINLIFE_BASE_URL.to_string(),
            fin_groups: vec![BANK_GROUP.to_string()],
            database_url: None,
            products_table: "finance_data".to_string(),
            subscribers_table: "user_emails".to_string(),
            comparison_procedure: "get_new_better_products_v3".to_string(),
            smtp_host: None,
            smtp_port: 587,
            smtp_user: None,
            smtp_password: None,
            smtp_from: None,
            email_subject: DEFAULT_SUBJECT.to_string(),
            detail_url: None,
            gate_timeout_secs: 300,
            gate_poke_interval_secs: 30,
            request_timeout_secs: 10,
            log_level: LogLevel::Info,
            lock_file: std::env::temp_dir().join("rates-pipeline.lock"),
            schedule_time: "09:00".to_string(),
            schedule_offset: "+09:00".to_string(),
        }
    }
}

fn parse_env<T: FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::invalid(var, format!("cannot parse {raw:?}")))
}

fn non_blank(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl PipelineConfig {
    /// Create a new PipelineConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileError(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::FileError(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from process environment variables over defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields with every variable `lookup` resolves.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).and_then(non_blank);

        if let Some(v) = var("FIN_API") {
            self.api_key = Some(Secret::new(v));
        }
        if let Some(v) = var("RATES_API_BASE_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = var("RATES_FIN_GROUPS") {
            self.fin_groups = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = var("RATES_DATABASE_URL") {
            self.database_url = Some(Secret::new(v));
        }
        if let Some(v) = var("RATES_PRODUCTS_TABLE") {
            self.products_table = v;
        }
        if let Some(v) = var("RATES_SUBSCRIBERS_TABLE") {
            self.subscribers_table = v;
        }
        if let Some(v) = var("RATES_COMPARISON_PROCEDURE") {
            self.comparison_procedure = v;
        }
        if let Some(v) = var("SMTP_HOST") {
            self.smtp_host = Some(v);
        }
        if let Some(v) = var("SMTP_PORT") {
            self.smtp_port = parse_env("SMTP_PORT", &v)?;
        }
        if let Some(v) = var("SMTP_USER") {
            self.smtp_user = Some(v);
        }
        if let Some(v) = var("SMTP_PASSWORD") {
            self.smtp_password = Some(Secret::new(v));
        }
        if let Some(v) = var("SMTP_FROM") {
            self.smtp_from = Some(v);
        }
        if let Some(v) = var("RATES_EMAIL_SUBJECT") {
            self.email_subject = v;
        }
        if let Some(v) = var("RATES_DETAIL_URL") {
            self.detail_url = Some(v);
        }
        if let Some(v) = var("RATES_GATE_TIMEOUT_SECS") {
            self.gate_timeout_secs = parse_env("RATES_GATE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("RATES_GATE_POKE_INTERVAL_SECS") {
            self.gate_poke_interval_secs = parse_env("RATES_GATE_POKE_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = var("RATES_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_env("RATES_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("RATES_LOG_LEVEL") {
            self.log_level = LogLevel::from_str(&v)?;
        }
        if let Some(v) = var("RATES_LOCK_FILE") {
            self.lock_file = PathBuf::from(v);
        }
        if let Some(v) = var("RATES_SCHEDULE_TIME") {
            self.schedule_time = v;
        }
        if let Some(v) = var("RATES_SCHEDULE_OFFSET") {
            self.schedule_offset = v;
        }
        Ok(())
    }

    /// Merge with CLI arguments (CLI takes precedence)
    pub fn merge_with_cli(&mut self, cli: &CliArgs) -> Result<(), ConfigError> {
        if let Some(log_level) = &cli.log_level {
            self.log_level = LogLevel::from_str(log_level)?;
        }
        if let Some(lock_file) = &cli.lock_file {
            self.lock_file = lock_file.clone();
        }
        Ok(())
    }

    /// Sender address, falling back to the SMTP user.
    pub fn sender(&self) -> Option<&str> {
        self.smtp_from.as_deref().or(self.smtp_user.as_deref())
    }

    /// Names of the required values that are absent.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.api_key.is_none() {
            missing.push("FIN_API");
        }
        if self.database_url.is_none() {
            missing.push("RATES_DATABASE_URL");
        }
        if self.smtp_host.is_none() {
            missing.push("SMTP_HOST");
        }
        if self.smtp_user.is_none() {
            missing.push("SMTP_USER");
        }
        if self.smtp_password.is_none() {
            missing.push("SMTP_PASSWORD");
        }
        if self.sender().is_none() {
            missing.push("SMTP_FROM");
        }
        missing
    }

    /// Validate the configuration
    ///
    /// Every missing required value is reported in one error before any
    /// value is checked for shape.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        if self.fin_groups.is_empty() {
            return Err(ConfigError::invalid("RATES_FIN_GROUPS", "at least one group is required"));
        }
        for (field, name) in [
            ("RATES_PRODUCTS_TABLE", &self.products_table),
            ("RATES_SUBSCRIBERS_TABLE", &self.subscribers_table),
            ("RATES_COMPARISON_PROCEDURE", &self.comparison_procedure),
        ] {
            if !is_sql_identifier(name) {
                return Err(ConfigError::invalid(field, format!("{name:?} is not a SQL identifier")));
            }
        }
        if self.smtp_port == 0 {
            return Err(ConfigError::invalid("SMTP_PORT", "must be between 1 and 65535"));
        }
        if self.gate_poke_interval_secs == 0 {
            return Err(ConfigError::invalid("RATES_GATE_POKE_INTERVAL_SECS", "must be positive"));
        }
        if self.gate_timeout_secs < self.gate_poke_interval_secs {
            return Err(ConfigError::invalid(
                "RATES_GATE_TIMEOUT_SECS",
                "must not be shorter than the poke interval",
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid("RATES_REQUEST_TIMEOUT_SECS", "must be positive"));
        }
        self.schedule()?;
        Ok(())
    }

    fn required<'a, T>(value: &'a Option<T>, name: &'static str) -> Result<&'a T, ConfigError> {
        value.as_ref().ok_or_else(|| ConfigError::Missing(vec![name]))
    }

    /// Gate polling policy.
    pub fn gate_policy(&self) -> GatePolicy {
        GatePolicy {
            poke_interval: Duration::from_secs(self.gate_poke_interval_secs),
            timeout: Duration::from_secs(self.gate_timeout_secs),
        }
    }

    /// Timeout of each rate API request, gate probes included.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Rate API client settings.
    pub fn finlife_settings(&self) -> Result<FinlifeSettings, ConfigError> {
        let key = Self::required(&self.api_key, "FIN_API")?;
        let mut settings = FinlifeSettings::new(key.expose());
        settings.base_url = self.api_base_url.clone();
        settings.groups = self.fin_groups.clone();
        settings.request_timeout = self.request_timeout();
        Ok(settings)
    }

    /// Store settings.
    pub fn store_settings(&self) -> Result<StoreSettings, ConfigError> {
        let url = Self::required(&self.database_url, "RATES_DATABASE_URL")?;
        let mut settings = StoreSettings::new(url.expose());
        settings.products_table = self.products_table.clone();
        settings.subscribers_table = self.subscribers_table.clone();
        settings.comparison_procedure = self.comparison_procedure.clone();
        Ok(settings)
    }

    /// SMTP relay settings.
    pub fn smtp_settings(&self) -> Result<SmtpSettings, ConfigError> {
        Ok(SmtpSettings {
            host: Self::required(&self.smtp_host, "SMTP_HOST")?.clone(),
            port: self.smtp_port,
            username: Self::required(&self.smtp_user, "SMTP_USER")?.clone(),
            password: Self::required(&self.smtp_password, "SMTP_PASSWORD")?.clone(),
            from: self
                .sender()
                .ok_or_else(|| ConfigError::Missing(vec!["SMTP_FROM"]))?
                .to_string(),
            timeout: Duration::from_secs(30),
        })
    }

    /// Message settings.
    pub fn notifier_settings(&self) -> NotifierSettings {
        NotifierSettings {
            subject: self.email_subject.clone(),
            detail_url: self.detail_url.clone(),
        }
    }

    /// Daily trigger.
    pub fn schedule(&self) -> Result<DailySchedule, ConfigError> {
        DailySchedule::parse(&self.schedule_time, &self.schedule_offset)
    }
}

/// CLI arguments structure
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Config file path
    pub config_file: Option<PathBuf>,
    /// Log level override
    pub log_level: Option<String>,
    /// Lock file override
    pub lock_file: Option<PathBuf>,
}

/// Build configuration from all sources
///
/// Priority (highest to lowest):
/// 1. CLI arguments
/// 2. Environment variables
/// 3. Config file
/// 4. Default values
pub fn build_config(cli: &CliArgs) -> Result<PipelineConfig, ConfigError> {
    build_config_with(cli, |key| std::env::var(key).ok())
}

/// [`build_config`] with an explicit environment lookup.
pub fn build_config_with<F>(cli: &CliArgs, lookup: F) -> Result<PipelineConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match &cli.config_file {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    config.apply_env(lookup)?;
    config.merge_with_cli(cli)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn complete() -> Vec<(&'static str, &'static str)> {
        vec![
            ("FIN_API", "abc123"),
            ("RATES_DATABASE_URL", "postgres://rates:pw@db/rates"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USER", "alerts@example.com"),
            ("SMTP_PASSWORD", "hunter2"),
        ]
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.smtp_port, 587);
        assert_eq!(config.gate_timeout_secs, 300);
        assert_eq!(config.gate_poke_interval_secs, 30);
        assert_eq!(config.fin_groups, vec!["020000"]);
        assert_eq!(config.products_table, "finance_data");
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.email_subject, DEFAULT_SUBJECT);
    }

    #[test]
    fn test_missing_values_reported_together() {
        let err = build_config_with(&CliArgs::default(), env(&[("FIN_API", "k")])).unwrap_err();
        match err {
            ConfigError::Missing(names) => assert_eq!(
                names,
                vec!["RATES_DATABASE_URL", "SMTP_HOST", "SMTP_USER", "SMTP_PASSWORD", "SMTP_FROM"]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sender_defaults_to_user() {
        let config = build_config_with(&CliArgs::default(), env(&complete())).unwrap();
        assert_eq!(config.sender(), Some("alerts@example.com"));

        let mut pairs = complete();
        pairs.push(("SMTP_FROM", "Rates <rates@example.com>"));
        let config = build_config_with(&CliArgs::default(), env(&pairs)).unwrap();
        assert_eq!(config.smtp_settings().unwrap().from, "Rates <rates@example.com>");
    }

    #[test]
    fn test_blank_variables_count_as_missing() {
        let mut pairs = complete();
        pairs.push(("SMTP_HOST", "  "));
        let lookup = env(&pairs);
        let err = build_config_with(&CliArgs::default(), lookup).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ref n) if n == &vec!["SMTP_HOST"]));
    }

    #[test]
    fn test_secrets_are_redacted() {
        let config = build_config_with(&CliArgs::default(), env(&complete())).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("abc123"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("rates:pw"));
        assert!(debug.contains("Secret(***)"));
    }

    #[test]
    fn test_env_overrides() {
        let mut pairs = complete();
        pairs.extend([
            ("RATES_FIN_GROUPS", "020000, 030300"),
            ("SMTP_PORT", "2525"),
            ("RATES_GATE_TIMEOUT_SECS", "60"),
            ("RATES_GATE_POKE_INTERVAL_SECS", "5"),
            ("RATES_LOG_LEVEL", "DEBUG"),
        ]);
        let config = build_config_with(&CliArgs::default(), env(&pairs)).unwrap();
        assert_eq!(config.fin_groups, vec!["020000", "030300"]);
        assert_eq!(config.smtp_port, 2525);
        assert_eq!(config.gate_policy().timeout, Duration::from_secs(60));
        assert_eq!(config.gate_policy().poke_interval, Duration::from_secs(5));
        assert_eq!(config.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_invalid_values() {
        let mut pairs = complete();
        pairs.push(("SMTP_PORT", "smtp"));
        let err = build_config_with(&CliArgs::default(), env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "SMTP_PORT", .. }));

        let mut pairs = complete();
        pairs.push(("RATES_PRODUCTS_TABLE", "finance_data; drop"));
        let err = build_config_with(&CliArgs::default(), env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "RATES_PRODUCTS_TABLE", .. }));

        let mut pairs = complete();
        pairs.push(("RATES_GATE_TIMEOUT_SECS", "10"));
        let err = build_config_with(&CliArgs::default(), env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "RATES_GATE_TIMEOUT_SECS", .. }));
    }

    #[test]
    fn test_priority_cli_env_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            api_key = "from-file"
            log_level = "warn"
            products_table = "file_products"
            gate_timeout_secs = 120
            "#
        )
        .unwrap();

        let mut pairs = complete();
        pairs.push(("RATES_GATE_TIMEOUT_SECS", "90"));
        let cli = CliArgs {
            config_file: Some(file.path().to_path_buf()),
            log_level: Some("error".to_string()),
            lock_file: None,
        };
        let config = build_config_with(&cli, env(&pairs)).unwrap();

        assert_eq!(config.api_key.as_ref().map(Secret::expose), Some("abc123"));
        assert_eq!(config.products_table, "file_products");
        assert_eq!(config.gate_timeout_secs, 90);
        assert_eq!(config.log_level, LogLevel::Error);
    }

    #[test]
    fn test_settings_projection() {
        let config = build_config_with(&CliArgs::default(), env(&complete())).unwrap();
        let feed = config.finlife_settings().unwrap();
        assert_eq!(feed.api_key, "abc123");
        assert_eq!(feed.groups, vec!["020000"]);
        let store = config.store_settings().unwrap();
        assert_eq!(store.comparison_procedure, "get_new_better_products_v3");
        assert_eq!(config.notifier_settings().subject, DEFAULT_SUBJECT);
    }

    #[test]
    fn test_request_timeout_applies_to_fetch_and_gates() {
        let config = build_config_with(&CliArgs::default(), env(&complete())).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(10));

        let mut pairs = complete();
        pairs.push(("RATES_REQUEST_TIMEOUT_SECS", "4"));
        let config = build_config_with(&CliArgs::default(), env(&pairs)).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(4));
        assert_eq!(
            config.finlife_settings().unwrap().request_timeout,
            config.request_timeout()
        );
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert_eq!(LogLevel::from_str("WARN").unwrap(), LogLevel::Warn);
        assert!(LogLevel::from_str("verbose").is_err());
        assert_eq!(format!("{}", LogLevel::Error), "error");
    }

    #[test]
    fn test_missing_file() {
        let err = PipelineConfig::from_file(Path::new("/nonexistent/rates.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
