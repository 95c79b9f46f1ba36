use std::path::PathBuf;

use chrono::Utc;

use pricedesk_core::cpq::NormalizationStats;
use pricedesk_db::repositories::{CustomerRepository, SqlCustomerRepository};
use pricedesk_db::{connect_with_config, migrations};

use crate::commands::{build_runtime, load_config, CommandResult, StepFailure};

/// Recomputes the scoring reference distribution from stored customers and writes it to
/// `output`, or to the configured statistics path when no output is given.
pub fn run(output: Option<PathBuf>) -> CommandResult {
    let config = match load_config("stats") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("stats") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let output = output.unwrap_or_else(|| config.pricing.normalization_stats_path.clone());

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let population = SqlCustomerRepository::new(pool.clone())
            .population(Utc::now().date_naive())
            .await
            .map_err(|error| ("population_query", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<_, StepFailure>(population)
    });

    let population = match result {
        Ok(population) => population,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("stats", error_class, message, exit_code);
        }
    };

    if population.is_empty() {
        return CommandResult::failure(
            "stats",
            "empty_population",
            "no customers stored; refusing to overwrite normalization statistics",
            6,
        );
    }

    let stats = NormalizationStats::from_population(&population);
    if let Err(error) = stats.write(&output) {
        return CommandResult::failure("stats", "stats_write", error.to_string(), 7);
    }

    CommandResult::success(
        "stats",
        format!(
            "wrote normalization statistics for {} customers to `{}`",
            population.len(),
            output.display()
        ),
    )
}
