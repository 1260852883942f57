//! Grouped reports and ad-hoc SQL exports.

use super::download::{self, attachment_name};
use crate::server::{
    api::ApiJson,
    auth::AuthUser,
    error::AppError,
    products::{model::ProductFilter, repo},
    state::AppState,
    store::row_to_record,
};
use axum::{extract::State, response::Response};
use dashboard_core::{
    BoxError,
    export::{Column, ExportJob, RecordSource},
};
use serde::Deserialize;

/// Product columns a report may group by.
const GROUPABLE: &[&str] = &["name", "category_name", "price", "foto"];

/// Aggregates a report may select, by output name.
const AGGREGATES: &[(&str, &str)] = &[
    ("count", "COUNT(*)"),
    ("total_price", "ROUND(SUM(price), 2)"),
    ("avg_price", "ROUND(AVG(price), 2)"),
    ("min_price", "MIN(price)"),
    ("max_price", "MAX(price)"),
];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportExport {
    pub model_name: Option<String>,
    pub group_by: Option<OneOrMany>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub filters: ProductFilter,
    pub filename: Option<String>,
}

/// A validated report: what to select and what to group by.
#[derive(Debug, PartialEq)]
struct ReportPlan {
    select: Vec<(&'static str, &'static str)>,
    group_by: Vec<&'static str>,
}

fn groupable(key: &str) -> Option<&'static str> {
    GROUPABLE.iter().copied().find(|column| *column == key)
}

impl ReportExport {
    fn plan(&self) -> Result<ReportPlan, AppError> {
        let group_by = self
            .group_by
            .as_ref()
            .map(|group| match group {
                OneOrMany::One(one) => vec![one.as_str()],
                OneOrMany::Many(many) => many.iter().map(String::as_str).collect(),
            })
            .unwrap_or_default();
        if self.model_name.is_none() || group_by.is_empty() || self.columns.is_empty() {
            return Err(AppError::Validation(
                "modelName, groupBy and columns are required".to_owned(),
            ));
        }
        if !self
            .model_name
            .as_deref()
            .is_some_and(|name| name.eq_ignore_ascii_case("product"))
        {
            return Err(AppError::Validation("Invalid model name".to_owned()));
        }

        let group_by = group_by
            .into_iter()
            .map(|key| {
                groupable(key)
                    .ok_or_else(|| AppError::Validation(format!("cannot group by {key}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let select = self
            .columns
            .iter()
            .map(|column| {
                let key = column.key.as_str();
                if let Some(grouped) = group_by.iter().copied().find(|group| *group == key) {
                    return Ok((grouped, grouped));
                }
                AGGREGATES
                    .iter()
                    .copied()
                    .find(|(name, _)| *name == key)
                    .ok_or_else(|| {
                        AppError::Validation(format!(
                            "column {key} must be a grouped column or one of: {}",
                            AGGREGATES
                                .iter()
                                .map(|(name, _)| *name)
                                .collect::<Vec<_>>()
                                .join(", ")
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ReportPlan { select, group_by })
    }
}

/// Aggregated product report, grouped by whitelisted columns.
pub async fn report(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ReportExport>,
) -> Result<Response, AppError> {
    let plan = body.plan()?;
    let filename = attachment_name(body.filename.as_deref(), "product_report");
    let filter = body.filters;
    let columns = body.columns;

    let pool = state.store.pool().clone();
    let source = RecordSource::paged(move |offset, limit| {
        let pool = pool.clone();
        let filter = filter.clone();
        let select = plan.select.clone();
        let group_by = plan.group_by.clone();
        async move {
            let rows = repo::grouped(&pool, &select, &group_by, &filter, offset, limit).await?;
            Ok::<_, BoxError>(rows)
        }
    });
    let job = ExportJob::new(columns, source).with_sheet_name("Report");

    download::stream(&state, job, filename).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryExport {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub columns: Vec<Column>,
    pub filename: Option<String>,
    pub sheet_name: Option<String>,
}

/// Reduces `query` to a single read-only statement.
///
/// Accepts one `SELECT` (optionally behind a `WITH`), drops a trailing
/// semicolon, and refuses anything naming a password column. The result is
/// only ever run as a subquery, where SQLite rejects data modification.
fn select_only(query: &str) -> Result<String, AppError> {
    let statement = query.trim().trim_end_matches(';').trim_end();
    let head = statement
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if !matches!(head.as_str(), "select" | "with") || statement.contains(';') {
        return Err(AppError::Validation(
            "query must be a single SELECT statement".to_owned(),
        ));
    }
    let names_password = statement
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|word| word.eq_ignore_ascii_case("password"));
    if names_password {
        return Err(AppError::Validation(
            "query may not read password columns".to_owned(),
        ));
    }
    Ok(statement.to_owned())
}

/// Streams the rows of a caller-supplied `SELECT`.
///
/// The statement is checked against the database before the download
/// starts, so a bad query is a 400 rather than a broken file.
pub async fn query(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiJson(body): ApiJson<QueryExport>,
) -> Result<Response, AppError> {
    if body.query.trim().is_empty() || body.columns.is_empty() {
        return Err(AppError::Validation(
            "query and columns are required".to_owned(),
        ));
    }
    let statement = select_only(&body.query)?;

    let pool = state.store.pool().clone();
    sqlx::query(&format!("SELECT * FROM ({statement}) LIMIT 0"))
        .fetch_all(&pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db) => {
                AppError::Validation(format!("Invalid query: {}", db.message()))
            }
            other => AppError::Database(other),
        })?;

    let paged_sql = format!("SELECT * FROM ({statement}) LIMIT ? OFFSET ?");
    let source = RecordSource::paged(move |offset, limit| {
        let pool = pool.clone();
        let sql = paged_sql.clone();
        async move {
            let rows = sqlx::query(&sql)
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&pool)
                .await?;
            rows.iter()
                .map(|row| row_to_record(row).map_err(BoxError::from))
                .collect::<Result<Vec<_>, _>>()
        }
    });
    let filename = attachment_name(body.filename.as_deref(), "query_export");
    let sheet_name = body.sheet_name.unwrap_or_else(|| "Query Results".to_owned());
    let job = ExportJob::new(body.columns, source).with_sheet_name(sheet_name);

    tracing::info!(user = caller.id_user, "Query export requested");
    download::stream(&state, job, filename).await
}
