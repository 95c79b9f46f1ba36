use axum::{extract::State, Json};
use chrono::Utc;
use tracing::{info, warn};

use pricedesk_core::cpq::{Catalog, PricedQuote, PricingRequest};
use pricedesk_core::errors::ApplicationError;

use super::{correlation_id, failure, ApiFailure, AppState};

/// Prices a cart. Stored history fills whatever the caller's customer bag leaves out;
/// a history lookup failure only degrades the signals, it never blocks pricing.
pub async fn calculate(
    State(state): State<AppState>,
    Json(request): Json<PricingRequest>,
) -> Result<Json<PricedQuote>, ApiFailure> {
    let correlation_id = correlation_id();
    let today = Utc::now().date_naive();
    let mut input = request.into_input(today);

    if let Some(code) = input.profile.code.clone() {
        match state.customers.find_profile(&code, today).await {
            Ok(Some(stored)) => input.profile = input.profile.merge_missing(stored),
            Ok(None) => {}
            Err(error) => warn!(
                event_name = "pricing.customer.history_unavailable",
                correlation_id = %correlation_id,
                customer_code = %code,
                error = %error,
                "pricing without stored customer history"
            ),
        }
    }

    let skus: Vec<String> = input.cart.iter().map(|line| line.sku.clone()).collect();
    let items = if skus.is_empty() {
        Vec::new()
    } else {
        state
            .catalog
            .find_by_skus(&skus)
            .await
            .map_err(|error| failure(ApplicationError::Persistence(error.to_string()), &correlation_id))?
    };

    let quote = state.pricer.price(&input, &Catalog::new(items));

    info!(
        event_name = "pricing.quote.priced",
        correlation_id = %correlation_id,
        customer_code = input.profile.code.as_deref().unwrap_or("walk-in"),
        customer_tier = %quote.customer_tier,
        lines = quote.items.len(),
        total = %quote.totals.total,
        "priced cart"
    );

    Ok(Json(quote))
}
