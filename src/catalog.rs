//! Public catalog: browse, search, categories and product detail. Only
//! active products are visible here; deactivated rows stay in the database
//! for order history.
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{audit, auth::MaybeUser, error::AppError, models::Product, state::AppState};

const RELATED_LIMIT: i64 = 4;

#[derive(Deserialize)]
pub struct BrowseQuery {
    category: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
}

#[derive(Serialize)]
pub struct ProductDetail {
    pub product: Product,
    pub related: Vec<Product>,
}

pub async fn active_products(
    pool: &SqlitePool,
    category: Option<&str>,
) -> Result<Vec<Product>, AppError> {
    let products = match category {
        Some(category) => {
            sqlx::query_as::<_, Product>(
                "SELECT * FROM products WHERE is_active = 1 AND category = ?1 ORDER BY name",
            )
            .bind(category)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Product>("SELECT * FROM products WHERE is_active = 1 ORDER BY name")
                .fetch_all(pool)
                .await?
        }
    };

    Ok(products)
}

pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BrowseQuery>,
) -> Result<Json<Vec<Product>>, AppError> {
    active_products(&state.pool, query.category.as_deref())
        .await
        .map(Json)
}

pub async fn search_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Product>>, AppError> {
    let keyword = query.q.unwrap_or_default();

    if keyword.is_empty() {
        return active_products(&state.pool, None).await.map(Json);
    }

    let pattern = format!("%{keyword}%");
    let products = sqlx::query_as::<_, Product>(
        "SELECT * FROM products
         WHERE is_active = 1 AND (name LIKE ?1 OR description LIKE ?1)
         ORDER BY name",
    )
    .bind(pattern)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(products))
}

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, AppError> {
    let categories: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT category FROM products
         WHERE category IS NOT NULL AND is_active = 1
         ORDER BY category",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(categories))
}

pub async fn product_detail(
    State(state): State<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
    Path(product_id): Path<i64>,
) -> Result<Json<ProductDetail>, AppError> {
    let product = sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE id = ?1 AND is_active = 1",
    )
    .bind(product_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("product"))?;

    let related = sqlx::query_as::<_, Product>(
        "SELECT * FROM products
         WHERE is_active = 1 AND category = ?1 AND id != ?2
         ORDER BY name
         LIMIT ?3",
    )
    .bind(&product.category)
    .bind(product.id)
    .bind(RELATED_LIMIT)
    .fetch_all(&state.pool)
    .await?;

    if let Some(user) = user {
        audit::record(
            &state.pool,
            Some(user.id),
            "view_product",
            Some(product.id),
            None,
        )
        .await?;
    }

    Ok(Json(ProductDetail { product, related }))
}
