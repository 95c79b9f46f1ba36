use sqlx::{Executor, Sqlite};

use super::RepositoryError;

/// Atomically bumps the counter for `scope` and returns the new value, starting at 1.
pub async fn next_value<'e, E>(executor: E, scope: &str) -> Result<u32, RepositoryError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let value: i64 = sqlx::query_scalar(
        "INSERT INTO sequence_counter (scope, value) VALUES (?, 1)
         ON CONFLICT(scope) DO UPDATE SET value = value + 1
         RETURNING value",
    )
    .bind(scope)
    .fetch_one(executor)
    .await?;

    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("sequence `{scope}` out of range: {value}"))
    })
}

#[cfg(test)]
mod tests {
    use super::next_value;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn scopes_count_independently() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        assert_eq!(next_value(&pool, "special_price:261019").await.expect("first"), 1);
        assert_eq!(next_value(&pool, "special_price:261019").await.expect("second"), 2);
        assert_eq!(next_value(&pool, "special_price:261020").await.expect("new day"), 1);
    }

    #[tokio::test]
    async fn rolled_back_transaction_does_not_consume_a_value() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let mut tx = pool.begin().await.expect("begin");
        assert_eq!(next_value(&mut *tx, "quotation:01:2610").await.expect("inside tx"), 1);
        tx.rollback().await.expect("rollback");

        assert_eq!(next_value(&pool, "quotation:01:2610").await.expect("after rollback"), 1);
    }
}
