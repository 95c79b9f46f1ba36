use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use pricedesk_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct ConfigField {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<ConfigField> {
    let field = |key, env_key, value: String| ConfigField { key, env_key, value };
    let mail = &config.mail;

    vec![
        field("database.url", "PRICEDESK_DATABASE_URL", config.database.url.clone()),
        field(
            "database.max_connections",
            "PRICEDESK_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        field(
            "database.timeout_secs",
            "PRICEDESK_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        field("server.bind_address", "PRICEDESK_SERVER_BIND_ADDRESS", config.server.bind_address.clone()),
        field("server.port", "PRICEDESK_SERVER_PORT", config.server.port.to_string()),
        field(
            "pricing.normalization_stats_path",
            "PRICEDESK_PRICING_NORMALIZATION_STATS_PATH",
            config.pricing.normalization_stats_path.display().to_string(),
        ),
        field("pricing.vat_rate", "PRICEDESK_PRICING_VAT_RATE", config.pricing.vat_rate.to_string()),
        field("pricing.branch_code", "PRICEDESK_PRICING_BRANCH_CODE", config.pricing.branch_code.clone()),
        field(
            "approvals.artifact_dir",
            "PRICEDESK_APPROVALS_ARTIFACT_DIR",
            config.approvals.artifact_dir.display().to_string(),
        ),
        field(
            "approvals.template_dir",
            "PRICEDESK_APPROVALS_TEMPLATE_DIR",
            config.approvals.template_dir.display().to_string(),
        ),
        field(
            "approvals.poll_interval_secs",
            "PRICEDESK_APPROVALS_POLL_INTERVAL_SECS",
            config.approvals.poll_interval_secs.to_string(),
        ),
        field("mail.enabled", "PRICEDESK_MAIL_ENABLED", mail.enabled.to_string()),
        field("mail.smtp_host", "PRICEDESK_MAIL_SMTP_HOST", or_unset(&mail.smtp_host)),
        field("mail.smtp_port", "PRICEDESK_MAIL_SMTP_PORT", mail.smtp_port.to_string()),
        field("mail.smtp_user", "PRICEDESK_MAIL_SMTP_USER", or_unset(&mail.smtp_user)),
        field("mail.smtp_password", "PRICEDESK_MAIL_SMTP_PASSWORD", redact(&mail.smtp_password)),
        field("mail.imap_host", "PRICEDESK_MAIL_IMAP_HOST", or_unset(&mail.imap_host)),
        field("mail.imap_port", "PRICEDESK_MAIL_IMAP_PORT", mail.imap_port.to_string()),
        field("mail.imap_user", "PRICEDESK_MAIL_IMAP_USER", or_unset(&mail.imap_user)),
        field("mail.imap_password", "PRICEDESK_MAIL_IMAP_PASSWORD", redact(&mail.imap_password)),
        field("mail.from_address", "PRICEDESK_MAIL_FROM_ADDRESS", or_unset(&mail.from_address)),
        field(
            "mail.notify_address",
            "PRICEDESK_MAIL_NOTIFY_ADDRESS",
            mail.notify_address.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        field("logging.level", "PRICEDESK_LOGGING_LEVEL", config.logging.level.clone()),
        field("logging.format", "PRICEDESK_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("pricedesk.toml"), PathBuf::from("config/pricedesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn or_unset(value: &str) -> String {
    if value.trim().is_empty() {
        "<unset>".to_string()
    } else {
        value.to_string()
    }
}

fn redact(secret: &SecretString) -> String {
    if secret.expose_secret().is_empty() {
        "<unset>".to_string()
    } else {
        "<redacted>".to_string()
    }
}
