use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use pricedesk_core::domain::quote::{QuoteNo, QuoteStatus, SpecialPriceFlag};
use pricedesk_core::domain::special_price::{
    NewSpecialPriceRequest, RequestNumber, Resolution, SpecialPriceItem, SpecialPriceRequest,
    SpecialPriceStatus,
};

use super::{
    is_unique_violation, parse_decimal, parse_optional_date, parse_optional_timestamp,
    parse_timestamp, sequence, RepositoryError, ResolveOutcome, SpecialPriceFilter,
    SpecialPricePage, SpecialPriceRepository, SpecialPriceSummary,
};
use crate::DbPool;

const MAX_NUMBERING_ATTEMPTS: usize = 5;

const HEADER_COLUMNS: &str = "id, request_number, quote_no, customer_code, customer_name,
    requester_name, requester_phone, request_reason, original_total, requested_total,
    discount_percentage, status, approver_email, approved_by, approved_at, rejection_reason,
    approval_pdf_files, branch, valid_from, valid_to, email_sent_at, created_at, updated_at";

pub struct SqlSpecialPriceRepository {
    pool: DbPool,
}

impl SqlSpecialPriceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn items_for(&self, request_id: i64) -> Result<Vec<SpecialPriceItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT item_code, item_name, quantity, unit, w1_price, requested_price,
                    original_amount, requested_amount, is_below_w1
             FROM special_price_request_item
             WHERE request_id = ?
             ORDER BY id",
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(item_from_row).collect()
    }

    async fn current_status(
        &self,
        request_number: &RequestNumber,
    ) -> Result<Option<SpecialPriceStatus>, RepositoryError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM special_price_request WHERE request_number = ?")
                .bind(request_number.as_str())
                .fetch_optional(&self.pool)
                .await?;
        status.map(|status| parse_status(&status)).transpose()
    }
}

#[async_trait::async_trait]
impl SpecialPriceRepository for SqlSpecialPriceRepository {
    async fn create(
        &self,
        request: NewSpecialPriceRequest,
        now: DateTime<Utc>,
    ) -> Result<SpecialPriceRequest, RepositoryError> {
        let today = now.date_naive();
        let scope = RequestNumber::sequence_scope(today);
        let mut record = SpecialPriceRequest::new(RequestNumber(String::new()), request, now);
        let mut tx = self.pool.begin().await?;

        let mut request_id = None;
        for _ in 0..MAX_NUMBERING_ATTEMPTS {
            let value = sequence::next_value(&mut *tx, &scope).await?;
            record.request_number = RequestNumber::format(today, value);

            let inserted = sqlx::query(
                "INSERT INTO special_price_request (
                    request_number, quote_no, customer_code, customer_name, requester_name,
                    requester_phone, request_reason, original_total, requested_total,
                    discount_percentage, status, approver_email, approval_pdf_files, branch,
                    valid_from, valid_to, created_at, updated_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, '[]', ?, ?, ?, ?, ?)",
            )
            .bind(record.request_number.as_str())
            .bind(record.quote_no.as_str())
            .bind(record.customer_code.as_deref())
            .bind(record.customer_name.as_deref())
            .bind(&record.requester_name)
            .bind(record.requester_phone.as_deref())
            .bind(&record.request_reason)
            .bind(record.original_total.to_string())
            .bind(record.requested_total.to_string())
            .bind(record.discount_percentage.to_string())
            .bind(SpecialPriceStatus::Pending.as_str())
            .bind(&record.approver_email)
            .bind(record.branch.as_deref())
            .bind(format_date(record.valid_from))
            .bind(format_date(record.valid_to))
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(result) => {
                    request_id = Some(result.last_insert_rowid());
                    break;
                }
                Err(error) if is_unique_violation(&error) => continue,
                Err(error) => return Err(error.into()),
            }
        }

        let Some(request_id) = request_id else {
            return Err(RepositoryError::Conflict(format!(
                "could not allocate a request number in `{scope}` after {MAX_NUMBERING_ATTEMPTS} attempts"
            )));
        };

        for item in &record.items {
            sqlx::query(
                "INSERT INTO special_price_request_item (
                    request_id, item_code, item_name, quantity, unit, w1_price, requested_price,
                    original_amount, requested_amount, is_below_w1, created_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(request_id)
            .bind(&item.item_code)
            .bind(&item.item_name)
            .bind(item.quantity.to_string())
            .bind(item.unit.as_deref())
            .bind(item.w1_price.to_string())
            .bind(item.requested_price.to_string())
            .bind(item.original_amount.to_string())
            .bind(item.requested_amount.to_string())
            .bind(item.is_below_w1)
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        let flipped = sqlx::query(
            "UPDATE quotation SET status = ?, special_price_status = ?, updated_at = ?
             WHERE quote_no = ?",
        )
        .bind(QuoteStatus::PendingApproval.as_str())
        .bind(SpecialPriceFlag::Pending.as_str())
        .bind(now.to_rfc3339())
        .bind(record.quote_no.as_str())
        .execute(&mut *tx)
        .await?;
        if flipped.rows_affected() == 0 {
            tx.rollback().await?;
            let quote_no = record.quote_no.as_str();
            return Err(RepositoryError::NotFound(format!("quotation {quote_no}")));
        }

        tx.commit().await?;
        Ok(record)
    }

    async fn find(
        &self,
        request_number: &RequestNumber,
    ) -> Result<Option<SpecialPriceRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {HEADER_COLUMNS} FROM special_price_request WHERE request_number = ?"
        ))
        .bind(request_number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let request_id: i64 = row.try_get("id")?;
        let mut request = request_from_row(row)?;
        request.items = self.items_for(request_id).await?;
        Ok(Some(request))
    }

    async fn list(&self, filter: SpecialPriceFilter) -> Result<SpecialPricePage, RepositoryError> {
        let status = filter.status.map(SpecialPriceStatus::as_str);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM special_price_request WHERE (?1 IS NULL OR status = ?1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(
            "SELECT request_number, quote_no, customer_code, customer_name, requester_name,
                    original_total, requested_total, discount_percentage, status, approver_email,
                    approved_by, approved_at, created_at, updated_at
             FROM special_price_request
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY created_at DESC, id DESC
             LIMIT ?2 OFFSET ?3",
        )
        .bind(status)
        .bind(i64::from(filter.limit))
        .bind(i64::from(filter.offset))
        .fetch_all(&self.pool)
        .await?;

        Ok(SpecialPricePage {
            items: rows.into_iter().map(summary_from_row).collect::<Result<Vec<_>, _>>()?,
            total: u64::try_from(total).unwrap_or_default(),
            limit: filter.limit,
            offset: filter.offset,
        })
    }

    async fn resolve(
        &self,
        request_number: &RequestNumber,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> Result<ResolveOutcome, RepositoryError> {
        let (quote_status, special_price_flag) = resolution.quotation_outcome();
        let mut tx = self.pool.begin().await?;

        let quote_no: Option<String> = sqlx::query_scalar(
            "SELECT quote_no FROM special_price_request WHERE request_number = ?",
        )
        .bind(request_number.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(quote_no) = quote_no else {
            return Ok(ResolveOutcome::NotFound);
        };

        let updated = match &resolution {
            Resolution::Approved { approved_by, attachments } => {
                let files = serde_json::to_string(attachments)
                    .map_err(|error| RepositoryError::Decode(error.to_string()))?;
                sqlx::query(
                    "UPDATE special_price_request
                     SET status = ?, approved_by = ?, approved_at = ?, approval_pdf_files = ?,
                         updated_at = ?
                     WHERE request_number = ? AND status = 'pending'",
                )
                .bind(SpecialPriceStatus::Approved.as_str())
                .bind(approved_by)
                .bind(now.to_rfc3339())
                .bind(files)
                .bind(now.to_rfc3339())
                .bind(request_number.as_str())
                .execute(&mut *tx)
                .await?
            }
            Resolution::Rejected { reason } => {
                sqlx::query(
                    "UPDATE special_price_request
                     SET status = ?, rejection_reason = ?, updated_at = ?
                     WHERE request_number = ? AND status = 'pending'",
                )
                .bind(SpecialPriceStatus::Rejected.as_str())
                .bind(reason)
                .bind(now.to_rfc3339())
                .bind(request_number.as_str())
                .execute(&mut *tx)
                .await?
            }
        };

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(match self.current_status(request_number).await? {
                Some(status) => ResolveOutcome::AlreadyResolved(status),
                None => ResolveOutcome::NotFound,
            });
        }

        sqlx::query(
            "UPDATE quotation SET status = ?, special_price_status = ?, updated_at = ?
             WHERE quote_no = ?",
        )
        .bind(quote_status.as_str())
        .bind(special_price_flag.as_str())
        .bind(now.to_rfc3339())
        .bind(&quote_no)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        match self.find(request_number).await? {
            Some(request) => Ok(ResolveOutcome::Resolved(Box::new(request))),
            None => Ok(ResolveOutcome::NotFound),
        }
    }

    async fn mark_email_sent(
        &self,
        request_number: &RequestNumber,
        sent_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE special_price_request SET email_sent_at = ?, updated_at = ?
             WHERE request_number = ?",
        )
        .bind(sent_at.to_rfc3339())
        .bind(sent_at.to_rfc3339())
        .bind(request_number.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|date| date.format("%Y-%m-%d").to_string())
}

fn parse_status(raw: &str) -> Result<SpecialPriceStatus, RepositoryError> {
    SpecialPriceStatus::parse(raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown special price status `{raw}`")))
}

fn request_from_row(row: SqliteRow) -> Result<SpecialPriceRequest, RepositoryError> {
    let status: String = row.try_get("status")?;
    let files: String = row.try_get("approval_pdf_files")?;
    let approval_pdf_files: Vec<String> = serde_json::from_str(&files).map_err(|error| {
        RepositoryError::Decode(format!("invalid approval_pdf_files `{files}` ({error})"))
    })?;

    Ok(SpecialPriceRequest {
        request_number: RequestNumber(row.try_get("request_number")?),
        quote_no: QuoteNo(row.try_get("quote_no")?),
        customer_code: row.try_get("customer_code")?,
        customer_name: row.try_get("customer_name")?,
        requester_name: row.try_get("requester_name")?,
        requester_phone: row.try_get("requester_phone")?,
        request_reason: row.try_get("request_reason")?,
        original_total: parse_decimal("original_total", row.try_get("original_total")?)?,
        requested_total: parse_decimal("requested_total", row.try_get("requested_total")?)?,
        discount_percentage: parse_decimal(
            "discount_percentage",
            row.try_get("discount_percentage")?,
        )?,
        status: parse_status(&status)?,
        approver_email: row.try_get("approver_email")?,
        approved_by: row.try_get("approved_by")?,
        approved_at: parse_optional_timestamp("approved_at", row.try_get("approved_at")?)?,
        rejection_reason: row.try_get("rejection_reason")?,
        approval_pdf_files,
        branch: row.try_get("branch")?,
        valid_from: parse_optional_date("valid_from", row.try_get("valid_from")?)?,
        valid_to: parse_optional_date("valid_to", row.try_get("valid_to")?)?,
        email_sent_at: parse_optional_timestamp("email_sent_at", row.try_get("email_sent_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
        items: Vec::new(),
    })
}

fn item_from_row(row: SqliteRow) -> Result<SpecialPriceItem, RepositoryError> {
    Ok(SpecialPriceItem {
        item_code: row.try_get("item_code")?,
        item_name: row.try_get("item_name")?,
        quantity: parse_decimal("quantity", row.try_get("quantity")?)?,
        unit: row.try_get("unit")?,
        w1_price: parse_decimal("w1_price", row.try_get("w1_price")?)?,
        requested_price: parse_decimal("requested_price", row.try_get("requested_price")?)?,
        original_amount: parse_decimal("original_amount", row.try_get("original_amount")?)?,
        requested_amount: parse_decimal("requested_amount", row.try_get("requested_amount")?)?,
        is_below_w1: row.try_get("is_below_w1")?,
    })
}

fn summary_from_row(row: SqliteRow) -> Result<SpecialPriceSummary, RepositoryError> {
    let status: String = row.try_get("status")?;
    Ok(SpecialPriceSummary {
        request_number: row.try_get("request_number")?,
        quote_no: row.try_get("quote_no")?,
        customer_code: row.try_get("customer_code")?,
        customer_name: row.try_get("customer_name")?,
        requester_name: row.try_get("requester_name")?,
        original_total: parse_decimal("original_total", row.try_get("original_total")?)?,
        requested_total: parse_decimal("requested_total", row.try_get("requested_total")?)?,
        discount_percentage: parse_decimal(
            "discount_percentage",
            row.try_get("discount_percentage")?,
        )?,
        status: parse_status(&status)?,
        approver_email: row.try_get("approver_email")?,
        approved_by: row.try_get("approved_by")?,
        approved_at: parse_optional_timestamp("approved_at", row.try_get("approved_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
