use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use pricedesk_core::domain::customer::CustomerProfile;
use pricedesk_core::errors::ApplicationError;

use super::{correlation_id, failure, ApiFailure, AppState};

pub async fn profile(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<CustomerProfile>, ApiFailure> {
    let correlation_id = correlation_id();
    let today = Utc::now().date_naive();

    state
        .customers
        .find_profile(&code, today)
        .await
        .map_err(|error| failure(ApplicationError::Persistence(error.to_string()), &correlation_id))?
        .map(Json)
        .ok_or_else(|| {
            failure(ApplicationError::NotFound(format!("customer {code}")), &correlation_id)
        })
}

#[cfg(test)]
mod tests {
    use axum::{
        extract::{Path, State},
        http::StatusCode,
        Json,
    };

    use super::profile;
    use crate::api::tests::api_harness;

    #[tokio::test]
    async fn stored_customer_profile_is_projected() {
        let harness = api_harness().await;
        let Json(projected) = profile(State(harness.state), Path("C001".to_string()))
            .await
            .expect("profile");

        assert_eq!(projected.code.as_deref(), Some("C001"));
        assert_eq!(projected.business_class.as_deref(), Some("R"));
        assert_eq!(projected.payment_terms.as_deref(), Some("NET 30 DAYS"));
        assert!(projected.tenure_years.is_some());
    }

    #[tokio::test]
    async fn unknown_customer_is_not_found() {
        let harness = api_harness().await;
        let (status, _) = profile(State(harness.state), Path("C404".to_string()))
            .await
            .expect_err("unknown customer");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
