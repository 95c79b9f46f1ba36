use pricedesk_db::{connect_with_config, migrations, DemoSeedDataset, SeedResult};

use crate::commands::{build_runtime, load_config, CommandResult, StepFailure};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seeded = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
        pool.close().await;

        let failed_checks = verification
            .checks
            .iter()
            .filter_map(|(check, present)| (!present).then_some(*check))
            .collect::<Vec<_>>();
        if verification.all_present {
            Ok::<SeedResult, StepFailure>(seeded)
        } else {
            Err(("seed_verification", verification_failure_message(&failed_checks), 6u8))
        }
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", seed_summary(&seeded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn seed_summary(seeded: &SeedResult) -> String {
    format!(
        "demo dataset loaded:\n  - catalog: {}\n  - customers: {}\n  - quotations: {}",
        seeded.catalog_items.join(", "),
        seeded.customers.join(", "),
        seeded.quotations.join(", ")
    )
}

fn verification_failure_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use pricedesk_db::SeedResult;

    use super::{seed_summary, verification_failure_message};

    #[test]
    fn verification_message_names_failed_checks() {
        assert_eq!(
            verification_failure_message(&["G-TINT-6MM", "quotation-counter"]),
            "seed verification failed for checks: G-TINT-6MM, quotation-counter"
        );
        assert_eq!(verification_failure_message(&[]), "some seed data failed to load");
    }

    #[test]
    fn summary_lists_every_seeded_group() {
        let summary = seed_summary(&SeedResult {
            catalog_items: vec!["A010010100101", "G-CLEAR-5MM"],
            customers: vec!["C001"],
            quotations: vec!["HQQT-2610/0001"],
        });

        assert!(summary.contains("  - catalog: A010010100101, G-CLEAR-5MM"));
        assert!(summary.contains("  - customers: C001"));
        assert!(summary.contains("  - quotations: HQQT-2610/0001"));
    }
}
