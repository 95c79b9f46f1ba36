//! JSON HTTP surface.
//!
//! - `POST /api/pricing/calculate`             price a cart for a customer or walk-in
//! - `POST /api/shipping/calculate`            delivery cost split
//! - `GET  /api/customers/{code}/profile`      projected scoring signals
//! - `POST /api/quotations`                    open a numbered quotation header
//! - `GET  /api/quotations/{quote_no}`         quotation header
//! - `/special-price-requests/...`             approval workflow, see [`special_price`]

pub mod customers;
pub mod pricing;
pub mod quotations;
pub mod shipping;
pub mod special_price;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::error;

use pricedesk_core::cpq::PricingEngine;
use pricedesk_core::errors::{ApplicationError, InterfaceError};
use pricedesk_db::repositories::{CatalogRepository, CustomerRepository, QuotationRepository};

use crate::workflow::SpecialPriceWorkflow;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogRepository>,
    pub customers: Arc<dyn CustomerRepository>,
    pub quotations: Arc<dyn QuotationRepository>,
    pub pricer: Arc<dyn PricingEngine>,
    pub workflow: Arc<SpecialPriceWorkflow>,
    pub branch_code: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub correlation_id: String,
}

pub type ApiFailure = (StatusCode, Json<ApiError>);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/pricing/calculate", post(pricing::calculate))
        .route("/api/shipping/calculate", post(shipping::calculate))
        .route("/api/customers/{code}/profile", get(customers::profile))
        .route("/api/quotations", post(quotations::create))
        .route("/api/quotations/{*quote_no}", get(quotations::find))
        .nest("/special-price-requests", special_price::router())
        .with_state(state)
}

pub(crate) fn correlation_id() -> String {
    format!("req-{}", uuid::Uuid::new_v4().simple())
}

/// Maps an application failure onto a status code and a caller-safe body.
pub(crate) fn failure(error: ApplicationError, correlation_id: &str) -> ApiFailure {
    let interface = error.into_interface(correlation_id);
    let (status, message) = match &interface {
        InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, message.clone()),
        InterfaceError::NotFound { message, .. } => (StatusCode::NOT_FOUND, message.clone()),
        InterfaceError::ServiceUnavailable { message, .. }
        | InterfaceError::Internal { message, .. } => {
            error!(
                event_name = "api.request.failed",
                correlation_id = %correlation_id,
                error = %message,
                "request failed"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, interface.user_message().to_string())
        }
    };

    (status, Json(ApiError { error: message, correlation_id: correlation_id.to_string() }))
}
