//! Special-price request endpoints, mounted under `/special-price-requests`.
//!
//! - `POST /`                               create and notify the approver
//! - `GET  /?status=&limit=&offset=`        page of requests, newest first
//! - `GET  /{n}`                            detail with items
//! - `GET  /{n}/pdf`                        audit document
//! - `POST /{n}/approve`                    `{approved_by}`
//! - `POST /{n}/reject`                     `{rejection_reason}`
//! - `GET  /{n}/approval-pdfs[/{index}]`    approver-forwarded attachments

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use pricedesk_core::domain::special_price::{
    RequestNumber, SpecialPriceRequest, SpecialPriceRequestDraft, SpecialPriceStatus,
};
use pricedesk_core::errors::{ApplicationError, DomainError};
use pricedesk_db::repositories::{SpecialPriceFilter, SpecialPricePage};

use super::{correlation_id, failure, ApiFailure, AppState};

const MAX_PAGE_SIZE: u32 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create).get(list))
        .route("/{request_number}", get(detail))
        .route("/{request_number}/pdf", get(document))
        .route("/{request_number}/approve", post(approve))
        .route("/{request_number}/reject", post(reject))
        .route("/{request_number}/approval-pdfs", get(approval_pdfs))
        .route("/{request_number}/approval-pdfs/{index}", get(approval_pdf))
}

#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub request_number: String,
    pub status: SpecialPriceStatus,
    pub email_sent: bool,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveBody {
    #[serde(default)]
    pub approved_by: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    #[serde(default)]
    pub rejection_reason: String,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct DecisionResponse {
    pub request_number: String,
    pub status: SpecialPriceStatus,
}

#[derive(Debug, Serialize)]
pub struct ApprovalFilesResponse {
    pub request_number: String,
    pub files: Vec<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(draft): Json<SpecialPriceRequestDraft>,
) -> Result<(StatusCode, Json<CreateResponse>), ApiFailure> {
    let correlation_id = correlation_id();
    let outcome = state
        .workflow
        .submit(draft, Utc::now())
        .await
        .map_err(|error| failure(error, &correlation_id))?;

    let message = match &outcome.email_error {
        None => format!(
            "Special price request {} created and sent to {}",
            outcome.request.request_number, outcome.request.approver_email
        ),
        Some(error) => format!(
            "Special price request {} created but the approval email failed: {error}",
            outcome.request.request_number
        ),
    };

    Ok((
        StatusCode::CREATED,
        Json(CreateResponse {
            request_number: outcome.request.request_number.to_string(),
            status: outcome.request.status,
            email_sent: outcome.email_sent,
            message,
        }),
    ))
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<SpecialPricePage>, ApiFailure> {
    let correlation_id = correlation_id();
    let filter = list_filter(&query).map_err(|error| failure(error.into(), &correlation_id))?;
    state.workflow.list(filter).await.map(Json).map_err(|error| failure(error, &correlation_id))
}

fn list_filter(query: &ListQuery) -> Result<SpecialPriceFilter, DomainError> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(
            SpecialPriceStatus::parse(&raw.to_ascii_lowercase())
                .ok_or_else(|| DomainError::Validation(format!("unknown status filter `{raw}`")))?,
        ),
    };

    let limit = query.limit.unwrap_or(SpecialPriceFilter::default().limit);
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(DomainError::Validation(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }

    Ok(SpecialPriceFilter { status, limit, offset: query.offset.unwrap_or(0) })
}

pub async fn detail(
    State(state): State<AppState>,
    Path(request_number): Path<String>,
) -> Result<Json<SpecialPriceRequest>, ApiFailure> {
    let correlation_id = correlation_id();
    state
        .workflow
        .find(&RequestNumber(request_number))
        .await
        .map(Json)
        .map_err(|error| failure(error, &correlation_id))
}

pub async fn document(
    State(state): State<AppState>,
    Path(request_number): Path<String>,
) -> Result<Response, ApiFailure> {
    let correlation_id = correlation_id();
    let document = state
        .workflow
        .document(&RequestNumber(request_number.clone()))
        .await
        .map_err(|error| failure(error, &correlation_id))?;
    Ok(document.into_response(&format!("{request_number}.pdf")))
}

pub async fn approve(
    State(state): State<AppState>,
    Path(request_number): Path<String>,
    Json(body): Json<ApproveBody>,
) -> Result<Json<DecisionResponse>, ApiFailure> {
    let correlation_id = correlation_id();
    let request = state
        .workflow
        .approve(&RequestNumber(request_number), &body.approved_by, Vec::new(), Utc::now())
        .await
        .map_err(|error| failure(error, &correlation_id))?;

    Ok(Json(DecisionResponse {
        request_number: request.request_number.to_string(),
        status: request.status,
    }))
}

pub async fn reject(
    State(state): State<AppState>,
    Path(request_number): Path<String>,
    Json(body): Json<RejectBody>,
) -> Result<Json<DecisionResponse>, ApiFailure> {
    let correlation_id = correlation_id();
    let request = state
        .workflow
        .reject(&RequestNumber(request_number), &body.rejection_reason, Utc::now())
        .await
        .map_err(|error| failure(error, &correlation_id))?;

    Ok(Json(DecisionResponse {
        request_number: request.request_number.to_string(),
        status: request.status,
    }))
}

pub async fn approval_pdfs(
    State(state): State<AppState>,
    Path(request_number): Path<String>,
) -> Result<Json<ApprovalFilesResponse>, ApiFailure> {
    let correlation_id = correlation_id();
    let files = state
        .workflow
        .approval_files(&RequestNumber(request_number.clone()))
        .await
        .map_err(|error| failure(error, &correlation_id))?;
    Ok(Json(ApprovalFilesResponse { request_number, files }))
}

pub async fn approval_pdf(
    State(state): State<AppState>,
    Path((request_number, index)): Path<(String, usize)>,
) -> Result<Response, ApiFailure> {
    let correlation_id = correlation_id();
    let (filename, bytes) = state
        .workflow
        .approval_file(&RequestNumber(request_number), index)
        .await
        .map_err(|error| failure(error, &correlation_id))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\""))
        .body(Body::from(bytes))
        .map_err(|error| failure(ApplicationError::Integration(error.to_string()), &correlation_id))
}
