use super::download::{self, attachment_name, tracked};
use crate::server::{
    api::{ApiJson, ApiQuery, ApiResponse},
    auth::{AuthUser, repo as user_repo},
    error::AppError,
    products::{model::ProductFilter, repo},
    state::AppState,
};
use axum::{Json, extract::State, response::Response};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use dashboard_core::{
    BoxError, Record,
    export::{Column, ExportJob, RecordSource, paginate},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub(super) fn to_record<T: Serialize>(row: &T) -> Result<Record, BoxError> {
    match serde_json::to_value(row)? {
        Value::Object(record) => Ok(record),
        other => Err(format!("expected a JSON object row, got {other}").into()),
    }
}

fn product_columns() -> Vec<Column> {
    vec![
        Column::new("ID", "id_product").with_width(10.0),
        Column::new("Product Name", "name").with_width(30.0),
        Column::new("Category", "category_name").with_width(20.0),
        Column::new("Price", "price").with_width(15.0),
        Column::new("Image", "foto").with_width(30.0),
        Column::new("Date Added", "date_added").with_width(20.0),
        Column::new("Last Updated", "date_updated").with_width(20.0),
    ]
}

/// Renders price as `$12.50` and timestamps as `YYYY-MM-DD`.
fn format_product_row(mut record: Record) -> Result<Record, BoxError> {
    let price = record
        .get("price")
        .and_then(Value::as_f64)
        .ok_or("product record has no numeric price")?;
    record.insert("price".to_owned(), Value::String(format!("${price:.2}")));

    for key in ["date_added", "date_updated"] {
        if let Some(Value::String(stamp)) = record.get_mut(key) {
            if let Some((date, _)) = stamp.split_once('T') {
                *stamp = date.to_owned();
            }
        }
    }
    Ok(record)
}

/// Every product matching the filter, paged straight out of the database.
pub async fn products(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<ProductFilter>,
) -> Result<Response, AppError> {
    let pool = state.store.pool().clone();
    let source = RecordSource::paged(move |offset, limit| {
        let pool = pool.clone();
        let filter = filter.clone();
        async move {
            let rows = repo::page(&pool, &filter, offset, limit).await?;
            rows.iter().map(to_record).collect::<Result<Vec<_>, _>>()
        }
    });
    let job = ExportJob::new(product_columns(), source)
        .with_sheet_name("Products")
        .with_transform(format_product_row);

    download::stream(&state, job, attachment_name(None, "products")).await
}

/// Every user account, without password hashes.
pub async fn users(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Response, AppError> {
    let pool = state.store.pool().clone();
    let source = RecordSource::paged(move |offset, limit| {
        let pool = pool.clone();
        async move {
            let rows = user_repo::page(&pool, offset, limit).await?;
            rows.iter().map(to_record).collect::<Result<Vec<_>, _>>()
        }
    });
    let columns = vec![
        Column::new("ID", "id_user").with_width(10.0),
        Column::new("Name", "name").with_width(20.0),
        Column::new("Email", "email").with_width(30.0),
        Column::new("Created At", "date_added").with_width(20.0),
        Column::new("Updated At", "date_updated").with_width(20.0),
    ];
    let job = ExportJob::new(columns, source).with_sheet_name("Users");

    tracing::info!(user = caller.id_user, "User export requested");
    download::stream(&state, job, attachment_name(None, "users_export")).await
}

/// Product count and average price per category.
pub async fn categories(State(state): State<AppState>) -> Result<Response, AppError> {
    let pool = state.store.pool().clone();
    let records = paginate(
        move |offset, limit| {
            let pool = pool.clone();
            async move {
                let rows = repo::category_summaries(&pool, offset, limit).await?;
                rows.iter().map(to_record).collect::<Result<Vec<_>, _>>()
            }
        },
        state.config.export_batch_size,
    );
    let columns = vec![
        Column::new("Category", "category_name"),
        Column::new("Products", "product_count"),
        Column::new("Average Price", "average_price"),
    ];
    let job = ExportJob::new(columns, RecordSource::Stream(records)).with_sheet_name("Categories");

    download::stream(&state, job, attachment_name(None, "categories_report")).await
}

/// Body of the ad-hoc export endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomExport {
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub data: Value,
    pub filename: Option<String>,
    pub sheet_name: Option<String>,
}

impl CustomExport {
    /// Validates the body before any row is produced.
    fn into_job(self) -> Result<(ExportJob, String), AppError> {
        if self.columns.is_empty() {
            return Err(AppError::Validation(
                "columns must be a non-empty array".to_owned(),
            ));
        }
        let source = RecordSource::try_from(self.data)?;
        let filename = attachment_name(self.filename.as_deref(), "custom_export");
        let mut job = ExportJob::new(self.columns, source);
        if let Some(name) = self.sheet_name {
            job = job.with_sheet_name(name);
        }
        Ok((job, filename))
    }
}

pub async fn custom(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CustomExport>,
) -> Result<Response, AppError> {
    let (job, filename) = body.into_job()?;
    download::stream(&state, job, filename).await
}

#[derive(Debug, Serialize)]
pub struct BufferedExport {
    pub filename: String,
    pub size: usize,
    pub rows: usize,
    /// Base64 of the whole workbook.
    pub buffer: String,
}

/// Same input as [`custom`], answered with the workbook inlined as base64.
pub async fn buffer(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CustomExport>,
) -> Result<Json<ApiResponse<BufferedExport>>, AppError> {
    let (job, filename) = body.into_job()?;
    let mut sink = dashboard_core::export::BufferSink::new();
    let summary = tracked(
        &state.exports_inflight,
        state.exporter.export_to_sink(job, &mut sink),
    )
    .await?;
    let bytes = sink.into_bytes();

    Ok(Json(ApiResponse::new(
        "Excel buffer generated successfully",
        BufferedExport {
            filename,
            size: bytes.len(),
            rows: summary.rows,
            buffer: STANDARD.encode(&bytes),
        },
    )))
}
