use axum::{extract::State, Json};
use tracing::info;

use pricedesk_core::cpq::shipping::{self, ShippingEstimate, ShippingRequest};
use pricedesk_core::errors::ApplicationError;

use super::{correlation_id, failure, ApiFailure, AppState};

pub async fn calculate(
    State(_state): State<AppState>,
    Json(request): Json<ShippingRequest>,
) -> Result<Json<ShippingEstimate>, ApiFailure> {
    let correlation_id = correlation_id();
    let estimate = shipping::estimate(&request)
        .map_err(|error| failure(ApplicationError::from(error), &correlation_id))?;

    info!(
        event_name = "shipping.estimate.calculated",
        correlation_id = %correlation_id,
        vehicle_type = %estimate.vehicle_type,
        shipping_cost = estimate.shipping_cost,
        customer_pay = estimate.customer_pay,
        "shipping estimated"
    );

    Ok(Json(estimate))
}
