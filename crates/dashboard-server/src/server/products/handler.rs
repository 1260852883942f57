use super::{
    model::{
        BatchDelete, BatchUpdate, BulkCreate, ListQuery, NewProduct, PageQuery, Paging,
        PriceRangeQuery, Product, ProductFilter, ProductOrder, ProductPage, ProductPatch,
        ProductStatistics, TransferCategory,
    },
    repo,
    upload::{self, ProductForm},
};
use crate::server::{
    api::{ApiJson, ApiPath, ApiQuery, ApiResponse},
    auth::AuthUser,
    error::AppError,
    state::AppState,
    transaction::MaybeTransaction,
};
use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
};
use dashboard_core::txn::execute_in_transaction;

type Reply<T> = Result<Json<ApiResponse<T>>, AppError>;

async fn paged(
    state: &AppState,
    filter: ProductFilter,
    paging: Paging,
    message: &str,
) -> Reply<ProductPage> {
    let pool = state.store.pool();
    let products = repo::page(pool, &filter, paging.offset(), paging.limit as usize).await?;
    let total = repo::count(pool, &filter).await?;

    Ok(Json(ApiResponse::new(
        message,
        ProductPage {
            products,
            pagination: paging.describe(total),
        },
    )))
}

pub async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Reply<ProductPage> {
    paged(
        &state,
        query.filter(),
        query.paging(),
        "Products retrieved successfully",
    )
    .await
}

/// Products whose name contains `term`, by name.
pub async fn search(
    State(state): State<AppState>,
    ApiPath(term): ApiPath<String>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Reply<ProductPage> {
    let filter = ProductFilter {
        search: Some(term),
        ..ProductFilter::default()
    };
    paged(
        &state,
        filter.ordered_by(ProductOrder::Name),
        Paging::new(query.page, query.limit),
        "Products retrieved successfully",
    )
    .await
}

/// Products of one category, by name.
pub async fn by_category(
    State(state): State<AppState>,
    ApiPath(category): ApiPath<String>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Reply<ProductPage> {
    let filter = ProductFilter {
        category: Some(category),
        ..ProductFilter::default()
    };
    paged(
        &state,
        filter.ordered_by(ProductOrder::Name),
        Paging::new(query.page, query.limit),
        "Products retrieved successfully",
    )
    .await
}

/// Products priced within `[minPrice, maxPrice]`, cheapest first. Either
/// bound may be left open, not both.
pub async fn price_range(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PriceRangeQuery>,
) -> Reply<ProductPage> {
    paged(
        &state,
        query.filter()?,
        Paging::new(query.page, query.limit),
        "Products retrieved successfully",
    )
    .await
}

pub async fn categories(State(state): State<AppState>) -> Reply<Vec<String>> {
    let categories = repo::categories(state.store.pool()).await?;
    Ok(Json(ApiResponse::new(
        "Categories retrieved successfully",
        categories,
    )))
}

pub async fn statistics(State(state): State<AppState>) -> Reply<ProductStatistics> {
    let statistics = repo::statistics(state.store.pool()).await?;
    Ok(Json(ApiResponse::new(
        "Statistics retrieved successfully",
        statistics,
    )))
}

pub async fn get_one(State(state): State<AppState>, ApiPath(id): ApiPath<i64>) -> Reply<Product> {
    let product = repo::find(state.store.pool(), id).await?;
    Ok(Json(ApiResponse::new("Product retrieved successfully", product)))
}

pub async fn create(
    State(state): State<AppState>,
    MaybeTransaction(txn): MaybeTransaction,
    AuthUser(user): AuthUser,
    ApiJson(product): ApiJson<NewProduct>,
) -> Result<(StatusCode, Json<ApiResponse<Product>>), AppError> {
    product.validate()?;
    let created = execute_in_transaction(&state.store, txn.as_ref(), move |tx| async move {
        repo::insert(&tx, &product).await
    })
    .await?;

    tracing::info!(id = created.id_product, user = user.id_user, "Product created");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new("Product created successfully", created)),
    ))
}

pub async fn update(
    State(state): State<AppState>,
    MaybeTransaction(txn): MaybeTransaction,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(patch): ApiJson<ProductPatch>,
) -> Reply<Product> {
    patch.validate()?;
    let updated = execute_in_transaction(&state.store, txn.as_ref(), move |tx| async move {
        repo::update(&tx, id, &patch).await
    })
    .await?;

    tracing::info!(id, user = user.id_user, "Product updated");
    Ok(Json(ApiResponse::new("Product updated successfully", updated)))
}

pub async fn remove(
    State(state): State<AppState>,
    MaybeTransaction(txn): MaybeTransaction,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Reply<()> {
    execute_in_transaction(&state.store, txn.as_ref(), move |tx| async move {
        repo::delete(&tx, id).await
    })
    .await?;

    tracing::info!(id, user = user.id_user, "Product deleted");
    Ok(Json(ApiResponse::message("Product deleted successfully")))
}

/// Creates every product or none.
pub async fn bulk_create(
    State(state): State<AppState>,
    MaybeTransaction(txn): MaybeTransaction,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<BulkCreate>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<Product>>>), AppError> {
    if body.products.is_empty() {
        return Err(AppError::Validation(
            "products must be a non-empty array".to_owned(),
        ));
    }

    let created = execute_in_transaction(&state.store, txn.as_ref(), move |tx| async move {
        let mut created = Vec::with_capacity(body.products.len());
        for (index, product) in body.products.iter().enumerate() {
            product
                .validate()
                .map_err(|err| AppError::Validation(format!("products[{index}]: {err}")))?;
            created.push(repo::insert(&tx, product).await?);
        }
        Ok::<_, AppError>(created)
    })
    .await?;

    tracing::info!(count = created.len(), user = user.id_user, "Products created in bulk");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            format!("{} products created successfully", created.len()),
            created,
        )),
    ))
}

/// Applies every update or none.
pub async fn batch_update(
    State(state): State<AppState>,
    MaybeTransaction(txn): MaybeTransaction,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<BatchUpdate>,
) -> Reply<Vec<Product>> {
    if body.updates.is_empty() {
        return Err(AppError::Validation(
            "updates must be a non-empty array".to_owned(),
        ));
    }

    let updated = execute_in_transaction(&state.store, txn.as_ref(), move |tx| async move {
        let mut updated = Vec::with_capacity(body.updates.len());
        for item in &body.updates {
            item.data.validate()?;
            updated.push(repo::update(&tx, item.id, &item.data).await?);
        }
        Ok::<_, AppError>(updated)
    })
    .await?;

    tracing::info!(count = updated.len(), user = user.id_user, "Products updated in batch");
    Ok(Json(ApiResponse::new(
        format!("{} products updated successfully", updated.len()),
        updated,
    )))
}

/// Deletes every listed product or none.
pub async fn batch_delete(
    State(state): State<AppState>,
    MaybeTransaction(txn): MaybeTransaction,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<BatchDelete>,
) -> Reply<()> {
    if body.ids.is_empty() {
        return Err(AppError::Validation("ids must be a non-empty array".to_owned()));
    }

    let count = body.ids.len();
    execute_in_transaction(&state.store, txn.as_ref(), move |tx| async move {
        for id in body.ids {
            repo::delete(&tx, id).await?;
        }
        Ok::<_, AppError>(())
    })
    .await?;

    tracing::info!(count, user = user.id_user, "Products deleted in batch");
    Ok(Json(ApiResponse::message(format!(
        "{count} products deleted successfully"
    ))))
}

pub async fn transfer_category(
    State(state): State<AppState>,
    MaybeTransaction(txn): MaybeTransaction,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<TransferCategory>,
) -> Reply<Vec<Product>> {
    let category = body.new_category.trim().to_owned();
    if body.product_ids.is_empty() || category.is_empty() {
        return Err(AppError::Validation(
            "productIds and newCategory are required".to_owned(),
        ));
    }

    let moved = execute_in_transaction(&state.store, txn.as_ref(), move |tx| async move {
        let mut moved = Vec::with_capacity(body.product_ids.len());
        for id in body.product_ids {
            moved.push(repo::set_category(&tx, id, &category).await?);
        }
        Ok::<_, AppError>(moved)
    })
    .await?;

    tracing::info!(
        count = moved.len(),
        user = user.id_user,
        "Products moved to another category"
    );
    Ok(Json(ApiResponse::new(
        format!("{} products transferred successfully", moved.len()),
        moved,
    )))
}

/// Creates a product from a multipart form. The image is deleted again if
/// the product is not created.
pub async fn create_with_image(
    State(state): State<AppState>,
    MaybeTransaction(txn): MaybeTransaction,
    AuthUser(user): AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<Product>>), AppError> {
    let mut form = ProductForm::read(multipart, &state.config).await?;
    let outcome = match form.new_product() {
        Ok(product) => {
            execute_in_transaction(&state.store, txn.as_ref(), move |tx| async move {
                repo::insert(&tx, &product).await
            })
            .await
        }
        Err(err) => Err(err),
    };
    let created = match outcome {
        Ok(created) => created,
        Err(err) => {
            form.discard_image().await;
            return Err(err);
        }
    };

    tracing::info!(id = created.id_product, user = user.id_user, "Product with image created");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            "Product with image created successfully",
            created,
        )),
    ))
}

/// Updates a product from a multipart form. A replaced image is deleted
/// once the update succeeds; a new image is deleted if it fails.
pub async fn update_with_image(
    State(state): State<AppState>,
    MaybeTransaction(txn): MaybeTransaction,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<i64>,
    multipart: Multipart,
) -> Reply<Product> {
    let mut form = ProductForm::read(multipart, &state.config).await?;
    let outcome = match form.patch() {
        Ok(patch) => {
            execute_in_transaction(&state.store, txn.as_ref(), move |tx| async move {
                let previous = repo::find_in(&tx, id).await?.foto;
                let updated = repo::update(&tx, id, &patch).await?;
                Ok::<_, AppError>((previous, updated))
            })
            .await
        }
        Err(err) => Err(err),
    };
    let (previous, updated) = match outcome {
        Ok(done) => done,
        Err(err) => {
            form.discard_image().await;
            return Err(err);
        }
    };

    if let Some(old) = previous.filter(|old| Some(old) != updated.foto.as_ref()) {
        if form.image.is_some() {
            upload::remove_image(&state.config, &old).await;
        }
    }

    tracing::info!(id, user = user.id_user, "Product with image updated");
    Ok(Json(ApiResponse::new(
        "Product with image updated successfully",
        updated,
    )))
}
