//! Product queries.
//!
//! Reads go straight to the pool. Writes take a [`StoreTx`] so they land in
//! the request's transaction.

use super::model::{
    CategorySummary, NewProduct, Product, ProductFilter, ProductOrder, ProductPatch,
    ProductStatistics,
};
use crate::server::{
    error::AppError,
    store::{StoreTx, row_to_record},
};
use dashboard_core::Record;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

const COLUMNS: &str = "id_product, name, category_name, price, foto, date_added, date_updated";

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn not_found() -> AppError {
    AppError::NotFound {
        resource: "Product",
    }
}

fn push_filter(query: &mut QueryBuilder<'_, Sqlite>, filter: &ProductFilter) {
    query.push(" WHERE 1 = 1");
    if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        query
            .push(" AND name LIKE ")
            .push_bind(format!("%{search}%"));
    }
    if let Some(category) = filter.category.as_deref().filter(|s| !s.is_empty()) {
        query
            .push(" AND category_name = ")
            .push_bind(category.to_owned());
    }
    if let Some(min) = filter.min_price {
        query.push(" AND price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        query.push(" AND price <= ").push_bind(max);
    }
}

fn order_clause(order: ProductOrder) -> &'static str {
    match order {
        ProductOrder::Id => " ORDER BY id_product",
        ProductOrder::Name => " ORDER BY name, id_product",
        ProductOrder::Price => " ORDER BY price, id_product",
    }
}

/// One page of products in the filter's order.
pub async fn page(
    pool: &SqlitePool,
    filter: &ProductFilter,
    offset: usize,
    limit: usize,
) -> Result<Vec<Product>, sqlx::Error> {
    let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM product"));
    push_filter(&mut query, filter);
    query
        .push(order_clause(filter.order))
        .push(" LIMIT ")
        .push_bind(limit as i64)
        .push(" OFFSET ")
        .push_bind(offset as i64);
    query.build_query_as::<Product>().fetch_all(pool).await
}

/// One page of a grouped aggregate over the filtered products.
///
/// `select` pairs an output name with its SQL expression and `group_by`
/// names plain columns. Both must come from a fixed whitelist; they are
/// spliced into the statement verbatim.
pub async fn grouped(
    pool: &SqlitePool,
    select: &[(&'static str, &'static str)],
    group_by: &[&'static str],
    filter: &ProductFilter,
    offset: usize,
    limit: usize,
) -> Result<Vec<Record>, sqlx::Error> {
    let mut query = QueryBuilder::<Sqlite>::new("SELECT ");
    let mut columns = query.separated(", ");
    for (name, expression) in select {
        columns.push(format!("{expression} AS {name}"));
    }
    query.push(" FROM product");
    push_filter(&mut query, filter);
    let groups = group_by.join(", ");
    query
        .push(format!(" GROUP BY {groups} ORDER BY {groups} LIMIT "))
        .push_bind(limit as i64)
        .push(" OFFSET ")
        .push_bind(offset as i64);

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(row_to_record).collect()
}

pub async fn count(pool: &SqlitePool, filter: &ProductFilter) -> Result<i64, sqlx::Error> {
    let mut query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM product");
    push_filter(&mut query, filter);
    query.build_query_scalar::<i64>().fetch_one(pool).await
}

pub async fn find(pool: &SqlitePool, id: i64) -> Result<Product, AppError> {
    sqlx::query_as::<_, Product>(&format!(
        "SELECT {COLUMNS} FROM product WHERE id_product = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(not_found)
}

/// The product as seen from inside `tx`.
pub async fn find_in(tx: &StoreTx, id: i64) -> Result<Product, AppError> {
    let mut conn = tx.conn().await?;
    sqlx::query_as::<_, Product>(&format!(
        "SELECT {COLUMNS} FROM product WHERE id_product = ?"
    ))
    .bind(id)
    .fetch_optional(&mut **conn)
    .await?
    .ok_or_else(not_found)
}

pub async fn statistics(pool: &SqlitePool) -> Result<ProductStatistics, sqlx::Error> {
    sqlx::query_as::<_, ProductStatistics>(
        "SELECT COUNT(*) AS total_products, \
         COUNT(DISTINCT category_name) AS total_categories, \
         ROUND(AVG(price), 2) AS avg_price, \
         MIN(price) AS min_price, \
         MAX(price) AS max_price \
         FROM product",
    )
    .fetch_one(pool)
    .await
}

pub async fn categories(pool: &SqlitePool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT category_name FROM product ORDER BY category_name",
    )
    .fetch_all(pool)
    .await
}

/// Per-category product count and average price, one page at a time.
pub async fn category_summaries(
    pool: &SqlitePool,
    offset: usize,
    limit: usize,
) -> Result<Vec<CategorySummary>, sqlx::Error> {
    sqlx::query_as::<_, CategorySummary>(
        "SELECT category_name, COUNT(*) AS product_count, \
         ROUND(AVG(price), 2) AS average_price \
         FROM product GROUP BY category_name ORDER BY category_name \
         LIMIT ? OFFSET ?",
    )
    .bind(limit as i64)
    .bind(offset as i64)
    .fetch_all(pool)
    .await
}

pub async fn insert(tx: &StoreTx, product: &NewProduct) -> Result<Product, AppError> {
    let now = now();
    let mut conn = tx.conn().await?;
    let created = sqlx::query_as::<_, Product>(&format!(
        "INSERT INTO product (name, category_name, price, foto, date_added, date_updated) \
         VALUES (?, ?, ?, ?, ?, ?) RETURNING {COLUMNS}"
    ))
    .bind(product.name.trim())
    .bind(product.category_name.trim())
    .bind(product.price)
    .bind(product.foto.as_deref())
    .bind(now.as_str())
    .bind(now.as_str())
    .fetch_one(&mut **conn)
    .await?;
    Ok(created)
}

pub async fn update(tx: &StoreTx, id: i64, patch: &ProductPatch) -> Result<Product, AppError> {
    let mut conn = tx.conn().await?;
    sqlx::query_as::<_, Product>(&format!(
        "UPDATE product SET \
         name = COALESCE(?, name), \
         category_name = COALESCE(?, category_name), \
         price = COALESCE(?, price), \
         foto = COALESCE(?, foto), \
         date_updated = ? \
         WHERE id_product = ? RETURNING {COLUMNS}"
    ))
    .bind(patch.name.as_deref().map(str::trim))
    .bind(patch.category_name.as_deref().map(str::trim))
    .bind(patch.price)
    .bind(patch.foto.as_deref())
    .bind(now())
    .bind(id)
    .fetch_optional(&mut **conn)
    .await?
    .ok_or_else(not_found)
}

pub async fn delete(tx: &StoreTx, id: i64) -> Result<(), AppError> {
    let mut conn = tx.conn().await?;
    let result = sqlx::query("DELETE FROM product WHERE id_product = ?")
        .bind(id)
        .execute(&mut **conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(not_found());
    }
    Ok(())
}

pub async fn set_category(tx: &StoreTx, id: i64, category: &str) -> Result<Product, AppError> {
    let mut conn = tx.conn().await?;
    sqlx::query_as::<_, Product>(&format!(
        "UPDATE product SET category_name = ?, date_updated = ? \
         WHERE id_product = ? RETURNING {COLUMNS}"
    ))
    .bind(category)
    .bind(now())
    .bind(id)
    .fetch_optional(&mut **conn)
    .await?
    .ok_or_else(not_found)
}
