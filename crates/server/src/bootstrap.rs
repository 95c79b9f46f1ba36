use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use pricedesk_core::config::{AppConfig, ConfigError, LoadOptions};
use pricedesk_core::cpq::{CustomerScoringModel, NormalizationStats, QuotePricer};
use pricedesk_db::repositories::{
    SqlCatalogRepository, SqlCustomerRepository, SqlQuotationRepository, SqlSpecialPriceRepository,
};
use pricedesk_db::{connect_with_config, migrations, DbPool};

use crate::api::AppState;
use crate::health::HealthState;
use crate::mail::{DisabledMailer, ImapMailbox, MailError, Mailer, SmtpMailer};
use crate::pdf::{PdfError, PdfGenerator};
use crate::poller::InboxPoller;
use crate::workflow::{SpecialPriceWorkflow, WorkflowSettings};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub stats: Arc<NormalizationStats>,
    pub workflow: Arc<SpecialPriceWorkflow>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("document templates failed to load: {0}")]
    Templates(#[from] PdfError),
    #[error("mail transport setup failed: {0}")]
    Mail(#[from] MailError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let stats = Arc::new(load_stats(&config));
    let documents = Arc::new(document_generator(&config)?);
    let mailer: Arc<dyn Mailer> = if config.mail.enabled {
        Arc::new(SmtpMailer::from_config(&config.mail)?)
    } else {
        info!(
            event_name = "system.bootstrap.mail_disabled",
            correlation_id = "bootstrap",
            "mail disabled; approval emails will be reported as not sent"
        );
        Arc::new(DisabledMailer)
    };

    let workflow = Arc::new(SpecialPriceWorkflow::new(
        Arc::new(SqlSpecialPriceRepository::new(db_pool.clone())),
        mailer,
        documents,
        WorkflowSettings::from_config(&config),
    ));

    Ok(Application { config, db_pool, stats, workflow })
}

impl Application {
    pub fn app_state(&self) -> AppState {
        let scoring = CustomerScoringModel::new(self.stats.clone());
        AppState {
            catalog: Arc::new(SqlCatalogRepository::new(self.db_pool.clone())),
            customers: Arc::new(SqlCustomerRepository::new(self.db_pool.clone())),
            quotations: Arc::new(SqlQuotationRepository::new(self.db_pool.clone())),
            pricer: Arc::new(QuotePricer::new(scoring, self.config.pricing.vat_rate)),
            workflow: self.workflow.clone(),
            branch_code: self.config.pricing.branch_code.clone(),
        }
    }

    pub fn health_state(&self) -> HealthState {
        HealthState { db_pool: self.db_pool.clone(), stats: self.stats.clone() }
    }

    /// The inbox poller, present only while mail is enabled.
    pub fn inbox_poller(&self) -> Option<InboxPoller> {
        if !self.config.mail.enabled {
            return None;
        }
        Some(InboxPoller::new(
            Arc::new(ImapMailbox::from_config(&self.config.mail)),
            self.workflow.clone(),
            Duration::from_secs(self.config.approvals.poll_interval_secs),
        ))
    }
}

/// Statistics are optional at runtime: without them every customer scores into the lowest band.
fn load_stats(config: &AppConfig) -> NormalizationStats {
    let path = &config.pricing.normalization_stats_path;
    match NormalizationStats::load(path) {
        Ok(stats) if stats.is_complete() => {
            info!(
                event_name = "system.bootstrap.stats_loaded",
                correlation_id = "bootstrap",
                path = %path.display(),
                "normalization statistics loaded"
            );
            stats
        }
        Ok(stats) => {
            warn!(
                event_name = "system.bootstrap.stats_incomplete",
                correlation_id = "bootstrap",
                path = %path.display(),
                "normalization statistics incomplete; missing dimensions score zero"
            );
            stats
        }
        Err(error) => {
            warn!(
                event_name = "system.bootstrap.stats_unavailable",
                correlation_id = "bootstrap",
                error = %error,
                "normalization statistics unavailable; customer scores fall back to zero"
            );
            NormalizationStats::unavailable()
        }
    }
}

fn document_generator(config: &AppConfig) -> Result<PdfGenerator, PdfError> {
    let template_dir = &config.approvals.template_dir;
    if template_dir.is_dir() {
        PdfGenerator::new(template_dir)
    } else {
        warn!(
            event_name = "system.bootstrap.embedded_templates",
            correlation_id = "bootstrap",
            template_dir = %template_dir.display(),
            "template directory missing; using built-in templates"
        );
        PdfGenerator::with_embedded_templates()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pricedesk_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn options(stats_path: std::path::PathBuf) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                normalization_stats_path: Some(stats_path),
                mail_enabled: Some(false),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_loads_statistics() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stats_path = dir.path().join("normalization_stats.json");
        fs::write(
            &stats_path,
            r#"[{"accum_6m_ln_mean": 10.5, "accum_6m_ln_sd": 1.2, "frequency_mean": 6.0,
                 "frequency_sd": 4.0, "tenure_mean": 5.0, "tenure_sd": 3.0}]"#,
        )
        .expect("write stats");

        let app = bootstrap(options(stats_path)).await.expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('catalog_item', 'customer', 'special_price_request')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("tables after bootstrap");
        assert_eq!(table_count, 3);
        assert!(app.stats.is_complete());
        assert!(app.inbox_poller().is_none());
        assert_eq!(app.app_state().branch_code, app.config.pricing.branch_code);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn missing_statistics_file_degrades_instead_of_failing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = bootstrap(options(dir.path().join("absent.json")))
            .await
            .expect("bootstrap should succeed without statistics");

        assert!(!app.stats.is_complete());
        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn enabled_mail_without_hosts_fails_fast() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut options = options(dir.path().join("absent.json"));
        options.overrides.mail_enabled = Some(true);
        options.overrides.smtp_host = Some(String::new());

        let error = bootstrap(options).await.err().expect("invalid mail config");
        assert!(error.to_string().contains("mail"));
    }
}
