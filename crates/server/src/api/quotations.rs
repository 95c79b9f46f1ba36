use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use pricedesk_core::domain::quote::{QuoteNo, Quotation};
use pricedesk_core::errors::{ApplicationError, DomainError};
use pricedesk_db::repositories::NewQuotation;

use super::{correlation_id, failure, ApiFailure, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct CreateQuotationRequest {
    pub customer_code: Option<String>,
    pub customer_name: Option<String>,
    pub sales_rep: Option<String>,
    #[serde(default)]
    pub total: Decimal,
    /// Overrides the configured branch for numbering.
    pub branch_code: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateQuotationRequest>,
) -> Result<(StatusCode, Json<Quotation>), ApiFailure> {
    let correlation_id = correlation_id();
    if body.total < Decimal::ZERO {
        return Err(failure(
            DomainError::Validation("total must not be negative".to_string()).into(),
            &correlation_id,
        ));
    }

    let branch_code = body
        .branch_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .unwrap_or(&state.branch_code)
        .to_string();
    let quotation = state
        .quotations
        .create(
            NewQuotation {
                customer_code: body.customer_code,
                customer_name: body.customer_name,
                sales_rep: body.sales_rep,
                total: body.total,
            },
            &branch_code,
            Utc::now(),
        )
        .await
        .map_err(|error| failure(ApplicationError::Persistence(error.to_string()), &correlation_id))?;

    info!(
        event_name = "quotation.created",
        correlation_id = %correlation_id,
        quote_no = %quotation.quote_no.as_str(),
        "quotation created"
    );

    Ok((StatusCode::CREATED, Json(quotation)))
}

pub async fn find(
    State(state): State<AppState>,
    Path(quote_no): Path<String>,
) -> Result<Json<Quotation>, ApiFailure> {
    let correlation_id = correlation_id();
    let quote_no = QuoteNo(quote_no.trim_start_matches('/').to_string());

    state
        .quotations
        .find(&quote_no)
        .await
        .map_err(|error| failure(ApplicationError::Persistence(error.to_string()), &correlation_id))?
        .map(Json)
        .ok_or_else(|| {
            failure(
                ApplicationError::NotFound(format!("quotation {}", quote_no.as_str())),
                &correlation_id,
            )
        })
}
