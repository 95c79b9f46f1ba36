use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub pricing: PricingConfig,
    pub approvals: ApprovalsConfig,
    pub mail: MailConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PricingConfig {
    pub normalization_stats_path: PathBuf,
    pub vat_rate: Decimal,
    pub branch_code: String,
}

#[derive(Clone, Debug)]
pub struct ApprovalsConfig {
    pub artifact_dir: PathBuf,
    pub template_dir: PathBuf,
    pub poll_interval_secs: u64,
    pub subject_marker: String,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_starttls: bool,
    pub smtp_user: String,
    pub smtp_password: SecretString,
    pub imap_host: String,
    pub imap_port: u16,
    pub imap_user: String,
    pub imap_password: SecretString,
    pub from_address: String,
    pub from_name: String,
    pub notify_address: Option<String>,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub normalization_stats_path: Option<PathBuf>,
    pub artifact_dir: Option<PathBuf>,
    pub mail_enabled: Option<bool>,
    pub smtp_host: Option<String>,
    pub imap_host: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://pricedesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            pricing: PricingConfig {
                normalization_stats_path: PathBuf::from("data/normalization_stats.json"),
                vat_rate: Decimal::new(7, 2),
                branch_code: "HQ".to_string(),
            },
            approvals: ApprovalsConfig {
                artifact_dir: PathBuf::from("data/special_price"),
                template_dir: PathBuf::from("templates"),
                poll_interval_secs: 60,
                subject_marker: "Special Price Request".to_string(),
            },
            mail: MailConfig {
                enabled: false,
                smtp_host: String::new(),
                smtp_port: 587,
                smtp_starttls: true,
                smtp_user: String::new(),
                smtp_password: String::new().into(),
                imap_host: String::new(),
                imap_port: 993,
                imap_user: String::new(),
                imap_password: String::new().into(),
                from_address: String::new(),
                from_name: "Pricedesk Approvals".to_string(),
                notify_address: None,
                max_retries: 3,
                retry_delay_secs: 60,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("pricedesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(path) = pricing.normalization_stats_path {
                self.pricing.normalization_stats_path = path;
            }
            if let Some(vat_rate) = pricing.vat_rate {
                self.pricing.vat_rate = vat_rate;
            }
            if let Some(branch_code) = pricing.branch_code {
                self.pricing.branch_code = branch_code;
            }
        }

        if let Some(approvals) = patch.approvals {
            if let Some(artifact_dir) = approvals.artifact_dir {
                self.approvals.artifact_dir = artifact_dir;
            }
            if let Some(template_dir) = approvals.template_dir {
                self.approvals.template_dir = template_dir;
            }
            if let Some(poll_interval_secs) = approvals.poll_interval_secs {
                self.approvals.poll_interval_secs = poll_interval_secs;
            }
            if let Some(subject_marker) = approvals.subject_marker {
                self.approvals.subject_marker = subject_marker;
            }
        }

        if let Some(mail) = patch.mail {
            self.apply_mail_patch(mail);
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_mail_patch(&mut self, mail: MailPatch) {
        if let Some(enabled) = mail.enabled {
            self.mail.enabled = enabled;
        }
        if let Some(smtp_host) = mail.smtp_host {
            self.mail.smtp_host = smtp_host;
        }
        if let Some(smtp_port) = mail.smtp_port {
            self.mail.smtp_port = smtp_port;
        }
        if let Some(smtp_starttls) = mail.smtp_starttls {
            self.mail.smtp_starttls = smtp_starttls;
        }
        if let Some(smtp_user) = mail.smtp_user {
            self.mail.smtp_user = smtp_user;
        }
        if let Some(smtp_password_value) = mail.smtp_password {
            self.mail.smtp_password = secret_value(smtp_password_value);
        }
        if let Some(imap_host) = mail.imap_host {
            self.mail.imap_host = imap_host;
        }
        if let Some(imap_port) = mail.imap_port {
            self.mail.imap_port = imap_port;
        }
        if let Some(imap_user) = mail.imap_user {
            self.mail.imap_user = imap_user;
        }
        if let Some(imap_password_value) = mail.imap_password {
            self.mail.imap_password = secret_value(imap_password_value);
        }
        if let Some(from_address) = mail.from_address {
            self.mail.from_address = from_address;
        }
        if let Some(from_name) = mail.from_name {
            self.mail.from_name = from_name;
        }
        if let Some(notify_address) = mail.notify_address {
            self.mail.notify_address = Some(notify_address);
        }
        if let Some(max_retries) = mail.max_retries {
            self.mail.max_retries = max_retries;
        }
        if let Some(retry_delay_secs) = mail.retry_delay_secs {
            self.mail.retry_delay_secs = retry_delay_secs;
        }
        if let Some(timeout_secs) = mail.timeout_secs {
            self.mail.timeout_secs = timeout_secs;
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PRICEDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PRICEDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("PRICEDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PRICEDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PRICEDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PRICEDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PRICEDESK_SERVER_PORT") {
            self.server.port = parse_u16("PRICEDESK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PRICEDESK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PRICEDESK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("PRICEDESK_PRICING_NORMALIZATION_STATS_PATH") {
            self.pricing.normalization_stats_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("PRICEDESK_PRICING_VAT_RATE") {
            self.pricing.vat_rate = parse_decimal("PRICEDESK_PRICING_VAT_RATE", &value)?;
        }
        if let Some(value) = read_env("PRICEDESK_PRICING_BRANCH_CODE") {
            self.pricing.branch_code = value;
        }

        if let Some(value) = read_env("PRICEDESK_APPROVALS_ARTIFACT_DIR") {
            self.approvals.artifact_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("PRICEDESK_APPROVALS_TEMPLATE_DIR") {
            self.approvals.template_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("PRICEDESK_APPROVALS_POLL_INTERVAL_SECS") {
            self.approvals.poll_interval_secs =
                parse_u64("PRICEDESK_APPROVALS_POLL_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("PRICEDESK_MAIL_ENABLED") {
            self.mail.enabled = parse_bool("PRICEDESK_MAIL_ENABLED", &value)?;
        }
        if let Some(value) = read_env("PRICEDESK_MAIL_SMTP_HOST") {
            self.mail.smtp_host = value;
        }
        if let Some(value) = read_env("PRICEDESK_MAIL_SMTP_PORT") {
            self.mail.smtp_port = parse_u16("PRICEDESK_MAIL_SMTP_PORT", &value)?;
        }
        if let Some(value) = read_env("PRICEDESK_MAIL_SMTP_USER") {
            self.mail.smtp_user = value;
        }
        if let Some(value) = read_env("PRICEDESK_MAIL_SMTP_PASSWORD") {
            self.mail.smtp_password = secret_value(value);
        }
        if let Some(value) = read_env("PRICEDESK_MAIL_IMAP_HOST") {
            self.mail.imap_host = value;
        }
        if let Some(value) = read_env("PRICEDESK_MAIL_IMAP_PORT") {
            self.mail.imap_port = parse_u16("PRICEDESK_MAIL_IMAP_PORT", &value)?;
        }
        if let Some(value) = read_env("PRICEDESK_MAIL_IMAP_USER") {
            self.mail.imap_user = value;
        }
        if let Some(value) = read_env("PRICEDESK_MAIL_IMAP_PASSWORD") {
            self.mail.imap_password = secret_value(value);
        }
        if let Some(value) = read_env("PRICEDESK_MAIL_FROM_ADDRESS") {
            self.mail.from_address = value;
        }
        if let Some(value) = read_env("PRICEDESK_MAIL_NOTIFY_ADDRESS") {
            self.mail.notify_address = Some(value);
        }

        let log_level =
            read_env("PRICEDESK_LOGGING_LEVEL").or_else(|| read_env("PRICEDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PRICEDESK_LOGGING_FORMAT").or_else(|| read_env("PRICEDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(path) = overrides.normalization_stats_path {
            self.pricing.normalization_stats_path = path;
        }
        if let Some(artifact_dir) = overrides.artifact_dir {
            self.approvals.artifact_dir = artifact_dir;
        }
        if let Some(enabled) = overrides.mail_enabled {
            self.mail.enabled = enabled;
        }
        if let Some(smtp_host) = overrides.smtp_host {
            self.mail.smtp_host = smtp_host;
        }
        if let Some(imap_host) = overrides.imap_host {
            self.mail.imap_host = imap_host;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_pricing(&self.pricing)?;
        validate_approvals(&self.approvals)?;
        validate_mail(&self.mail)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

impl MailConfig {
    pub fn has_smtp_credentials(&self) -> bool {
        !self.smtp_user.trim().is_empty() && !self.smtp_password.expose_secret().is_empty()
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("pricedesk.toml"), PathBuf::from("config/pricedesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    if pricing.vat_rate.is_sign_negative() || pricing.vat_rate >= Decimal::ONE {
        return Err(ConfigError::Validation(
            "pricing.vat_rate must be a fraction in range 0..1 (e.g. 0.07)".to_string(),
        ));
    }

    if pricing.branch_code.trim().chars().count() < 2 {
        return Err(ConfigError::Validation(
            "pricing.branch_code must have at least two characters".to_string(),
        ));
    }

    Ok(())
}

fn validate_approvals(approvals: &ApprovalsConfig) -> Result<(), ConfigError> {
    if approvals.poll_interval_secs == 0 || approvals.poll_interval_secs > 3600 {
        return Err(ConfigError::Validation(
            "approvals.poll_interval_secs must be in range 1..=3600".to_string(),
        ));
    }

    if approvals.subject_marker.trim().is_empty() {
        return Err(ConfigError::Validation(
            "approvals.subject_marker must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_mail(mail: &MailConfig) -> Result<(), ConfigError> {
    if mail.timeout_secs == 0 || mail.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "mail.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if mail.max_retries == 0 {
        return Err(ConfigError::Validation(
            "mail.max_retries must be at least 1".to_string(),
        ));
    }

    if !mail.enabled {
        return Ok(());
    }

    if mail.smtp_host.trim().is_empty() {
        return Err(ConfigError::Validation(
            "mail.smtp_host is required when mail.enabled is true".to_string(),
        ));
    }
    if mail.imap_host.trim().is_empty() || mail.imap_user.trim().is_empty() {
        return Err(ConfigError::Validation(
            "mail.imap_host and mail.imap_user are required when mail.enabled is true".to_string(),
        ));
    }
    if !mail.from_address.contains('@') {
        return Err(ConfigError::Validation(
            "mail.from_address must be an email address when mail.enabled is true".to_string(),
        ));
    }
    if let Some(notify) = &mail.notify_address {
        if !notify.contains('@') {
            return Err(ConfigError::Validation(
                "mail.notify_address must be an email address".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    pricing: Option<PricingPatch>,
    approvals: Option<ApprovalsPatch>,
    mail: Option<MailPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    normalization_stats_path: Option<PathBuf>,
    vat_rate: Option<Decimal>,
    branch_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApprovalsPatch {
    artifact_dir: Option<PathBuf>,
    template_dir: Option<PathBuf>,
    poll_interval_secs: Option<u64>,
    subject_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MailPatch {
    enabled: Option<bool>,
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    smtp_starttls: Option<bool>,
    smtp_user: Option<String>,
    smtp_password: Option<String>,
    imap_host: Option<String>,
    imap_port: Option<u16>,
    imap_user: Option<String>,
    imap_password: Option<String>,
    from_address: Option<String>,
    from_name: Option<String>,
    notify_address: Option<String>,
    max_retries: Option<u32>,
    retry_delay_secs: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
