use super::super::error::AppError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id_product: i64,
    pub name: String,
    pub category_name: String,
    pub price: f64,
    pub foto: Option<String>,
    pub date_added: String,
    pub date_updated: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct CategorySummary {
    pub category_name: String,
    pub product_count: i64,
    pub average_price: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub category_name: String,
    pub price: f64,
    #[serde(default)]
    pub foto: Option<String>,
}

impl NewProduct {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text("name", &self.name)?;
        require_text("category_name", &self.category_name)?;
        require_price(self.price)
    }
}

/// Partial update. Absent fields keep their current value.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub category_name: Option<String>,
    pub price: Option<f64>,
    pub foto: Option<String>,
}

impl ProductPatch {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(name) = &self.name {
            require_text("name", name)?;
        }
        if let Some(category) = &self.category_name {
            require_text("category_name", category)?;
        }
        if let Some(price) = self.price {
            require_price(price)?;
        }
        Ok(())
    }
}

fn require_text(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_price(price: f64) -> Result<(), AppError> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::Validation(
            "price must be a non-negative number".to_owned(),
        ));
    }
    Ok(())
}

/// Sort order of a product listing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProductOrder {
    #[default]
    Id,
    Name,
    Price,
}

/// Filters shared by the listings and the product export.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "minPrice")]
    pub min_price: Option<f64>,
    #[serde(rename = "maxPrice")]
    pub max_price: Option<f64>,
    #[serde(skip)]
    pub order: ProductOrder,
}

impl ProductFilter {
    pub fn ordered_by(mut self, order: ProductOrder) -> Self {
        self.order = order;
        self
    }
}

/// Page window shared by every listing endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Paging {
    pub page: u32,
    pub limit: u32,
}

impl Paging {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }

    pub fn describe(self, total: i64) -> Pagination {
        let limit = i64::from(self.limit);
        Pagination {
            page: self.page,
            limit: self.limit,
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub category: Option<String>,
}

impl ListQuery {
    pub fn filter(&self) -> ProductFilter {
        ProductFilter {
            search: self.search.clone(),
            category: self.category.clone(),
            ..ProductFilter::default()
        }
    }

    pub fn paging(&self) -> Paging {
        Paging::new(self.page, self.limit)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRangeQuery {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PriceRangeQuery {
    pub fn filter(&self) -> Result<ProductFilter, AppError> {
        if self.min_price.is_none() && self.max_price.is_none() {
            return Err(AppError::Validation(
                "Please provide minPrice or maxPrice".to_owned(),
            ));
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(AppError::Validation(
                    "minPrice must not exceed maxPrice".to_owned(),
                ));
            }
        }
        Ok(ProductFilter {
            min_price: self.min_price,
            max_price: self.max_price,
            ..ProductFilter::default()
        }
        .ordered_by(ProductOrder::Price))
    }
}

/// Catalogue-wide figures. Price figures are absent on an empty catalogue.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProductStatistics {
    pub total_products: i64,
    pub total_categories: i64,
    pub avg_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct BulkCreate {
    pub products: Vec<NewProduct>,
}

#[derive(Debug, Deserialize)]
pub struct BatchUpdate {
    pub updates: Vec<BatchUpdateItem>,
}

#[derive(Debug, Deserialize)]
pub struct BatchUpdateItem {
    pub id: i64,
    pub data: ProductPatch,
}

#[derive(Debug, Deserialize)]
pub struct BatchDelete {
    pub ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferCategory {
    pub product_ids: Vec<i64>,
    pub new_category: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub pagination: Pagination,
}
