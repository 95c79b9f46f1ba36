//! Audit artifact and email bodies for special-price requests.
//!
//! Templates are rendered with Tera and converted to PDF with `wkhtmltopdf` when it is on
//! the PATH; otherwise the rendered HTML is kept as the artifact.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tera::{Context, Tera};
use tokio::process::Command;
use tracing::{error, info, warn};

use pricedesk_core::domain::special_price::SpecialPriceRequest;

pub const REQUEST_TEMPLATE: &str = "special_price/request.html.tera";
pub const EMAIL_TEMPLATE: &str = "special_price/email.html.tera";
pub const DECISION_TEMPLATE: &str = "special_price/decision.html.tera";

const COMPANY_NAME: &str = "Pricedesk";
const PRIMARY_COLOR: &str = "#2563eb";

pub fn register_template_filters(tera: &mut Tera) {
    tera.register_filter("money", tera_money_filter);
}

/// Two-decimal rendering for amounts; non-numbers render as `0.00`.
fn tera_money_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let number = match value {
        tera::Value::Number(number) => number.as_f64().unwrap_or(0.0),
        tera::Value::String(raw) => raw.parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(tera::Value::String(format!("{number:.2}")))
}

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("template error: {0}")]
    Template(String),
    #[error("conversion error: {0}")]
    Conversion(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug)]
pub struct PdfGenerator {
    tera: Tera,
    wkhtmltopdf_path: Option<PathBuf>,
}

impl PdfGenerator {
    pub fn new(template_dir: &Path) -> Result<Self, PdfError> {
        let pattern = format!("{}/**/*.tera", template_dir.display());
        let mut tera = Tera::new(&pattern).map_err(|error| PdfError::Template(error.to_string()))?;
        register_template_filters(&mut tera);

        for required in [REQUEST_TEMPLATE, EMAIL_TEMPLATE, DECISION_TEMPLATE] {
            if !tera.get_template_names().any(|name| name == required) {
                return Err(PdfError::Template(format!(
                    "template `{required}` not found under {}",
                    template_dir.display()
                )));
            }
        }

        Ok(Self { tera, wkhtmltopdf_path: locate_wkhtmltopdf() })
    }

    /// Templates compiled into the binary, used when no template directory is deployed.
    pub fn with_embedded_templates() -> Result<Self, PdfError> {
        let mut tera = Tera::default();
        register_template_filters(&mut tera);
        tera.add_raw_templates(vec![
            (
                REQUEST_TEMPLATE,
                include_str!("../../../templates/special_price/request.html.tera"),
            ),
            (EMAIL_TEMPLATE, include_str!("../../../templates/special_price/email.html.tera")),
            (
                DECISION_TEMPLATE,
                include_str!("../../../templates/special_price/decision.html.tera"),
            ),
        ])
        .map_err(|error| PdfError::Template(error.to_string()))?;

        Ok(Self { tera, wkhtmltopdf_path: locate_wkhtmltopdf() })
    }

    /// Renders HTML only, regardless of converter availability.
    pub fn html_only(mut self) -> Self {
        self.wkhtmltopdf_path = None;
        self
    }

    pub fn render_request_html(&self, request: &SpecialPriceRequest) -> Result<String, PdfError> {
        let mut context = base_context(request);
        context.insert("generated_at", &Utc::now().format("%Y-%m-%d %H:%M UTC").to_string());
        self.render(REQUEST_TEMPLATE, &context)
    }

    pub fn render_email_body(
        &self,
        request: &SpecialPriceRequest,
        instructions: &str,
    ) -> Result<String, PdfError> {
        let mut context = base_context(request);
        context.insert("instructions", instructions);
        self.render(EMAIL_TEMPLATE, &context)
    }

    pub fn render_decision_body(&self, request: &SpecialPriceRequest) -> Result<String, PdfError> {
        self.render(DECISION_TEMPLATE, &base_context(request))
    }

    pub async fn render_request_document(
        &self,
        request: &SpecialPriceRequest,
    ) -> Result<PdfResult, PdfError> {
        let html = self.render_request_html(request)?;

        let Some(wkhtmltopdf) = &self.wkhtmltopdf_path else {
            return Ok(PdfResult::Html(html));
        };
        match convert_html_to_pdf(&html, wkhtmltopdf).await {
            Ok(bytes) => Ok(PdfResult::Pdf(bytes)),
            Err(error) => {
                warn!(
                    event_name = "special_price.pdf.conversion_failed",
                    request_number = %request.request_number,
                    error = %error,
                    "PDF conversion failed, keeping HTML"
                );
                Ok(PdfResult::Html(html))
            }
        }
    }

    fn render(&self, template: &str, context: &Context) -> Result<String, PdfError> {
        self.tera.render(template, context).map_err(|error| PdfError::Template(error.to_string()))
    }
}

fn base_context(request: &SpecialPriceRequest) -> Context {
    let mut context = Context::new();
    context.insert("request", request);
    context.insert("company_name", COMPANY_NAME);
    context.insert("primary_color", PRIMARY_COLOR);
    context
}

fn locate_wkhtmltopdf() -> Option<PathBuf> {
    match which::which("wkhtmltopdf") {
        Ok(path) => {
            info!(path = %path.display(), "wkhtmltopdf found");
            Some(path)
        }
        Err(_) => {
            warn!("wkhtmltopdf not found in PATH - request documents will be stored as HTML");
            None
        }
    }
}

async fn convert_html_to_pdf(html: &str, wkhtmltopdf: &Path) -> Result<Vec<u8>, PdfError> {
    let temp_dir = std::env::temp_dir();
    let stem = uuid::Uuid::new_v4();
    let html_path = temp_dir.join(format!("special_price_{stem}.html"));
    let pdf_path = temp_dir.join(format!("special_price_{stem}.pdf"));

    tokio::fs::write(&html_path, html).await?;

    let output = Command::new(wkhtmltopdf)
        .args(["--page-size", "A4", "--encoding", "utf-8", "--quiet"])
        .args(["--margin-top", "10mm", "--margin-bottom", "10mm"])
        .args(["--margin-left", "10mm", "--margin-right", "10mm"])
        .arg(&html_path)
        .arg(&pdf_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    let result = match output {
        Ok(output) if output.status.success() => {
            tokio::fs::read(&pdf_path).await.map_err(PdfError::from)
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            error!(stderr = %stderr, "wkhtmltopdf failed");
            Err(PdfError::Conversion(stderr))
        }
        Err(error) => Err(PdfError::Io(error)),
    };

    let _ = tokio::fs::remove_file(&html_path).await;
    let _ = tokio::fs::remove_file(&pdf_path).await;
    result
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PdfResult {
    Pdf(Vec<u8>),
    Html(String),
}

impl PdfResult {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf(_) => "pdf",
            Self::Html(_) => "html",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Pdf(_) => "application/pdf",
            Self::Html(_) => "text/html; charset=utf-8",
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Pdf(bytes) => bytes,
            Self::Html(html) => html.as_bytes(),
        }
    }

    pub fn into_response(self, filename: &str) -> Response {
        let content_type = self.content_type();
        let disposition = match &self {
            Self::Pdf(_) => format!("attachment; filename=\"{filename}\""),
            Self::Html(_) => "inline".to_string(),
        };
        let body = match self {
            Self::Pdf(bytes) => Body::from(bytes),
            Self::Html(html) => Body::from(html),
        };

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_DISPOSITION, disposition)
            .body(body)
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}
