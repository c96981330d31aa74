//! Per-user cart, stored as one row per (user, product). The view joins the
//! live catalog, so prices shown here can differ from the snapshot taken at
//! checkout.
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{auth::AuthUser, error::AppError, state::AppState};

#[derive(Deserialize)]
pub struct AddToCart {
    pub product_id: i64,
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartLine {
    pub product_id: i64,
    pub name: String,
    pub price_cents: i64,
    pub quantity: i64,
    pub line_total_cents: i64,
}

#[derive(Serialize)]
pub struct CartView {
    pub items: Vec<CartLine>,
    pub total_cents: i64,
}

pub async fn cart_lines(pool: &SqlitePool, user_id: i64) -> Result<Vec<CartLine>, AppError> {
    let lines = sqlx::query_as::<_, CartLine>(
        "SELECT p.id AS product_id, p.name, p.price_cents, c.quantity,
                p.price_cents * c.quantity AS line_total_cents
         FROM cart_items c
         JOIN products p ON p.id = c.product_id
         WHERE c.user_id = ?1
         ORDER BY p.name",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(lines)
}

pub async fn view(pool: &SqlitePool, user_id: i64) -> Result<CartView, AppError> {
    let items = cart_lines(pool, user_id).await?;
    let total_cents = items.iter().map(|line| line.line_total_cents).sum();

    Ok(CartView { items, total_cents })
}

/// Adds a product to the cart, accumulating quantity on repeated adds.
/// Unknown or deactivated products are silently ignored.
pub async fn add_item(
    pool: &SqlitePool,
    user_id: i64,
    product_id: i64,
    quantity: i64,
) -> Result<(), AppError> {
    let exists: Option<i64> =
        sqlx::query_scalar("SELECT id FROM products WHERE id = ?1 AND is_active = 1")
            .bind(product_id)
            .fetch_optional(pool)
            .await?;

    if exists.is_none() {
        return Ok(());
    }

    sqlx::query(
        "INSERT INTO cart_items (user_id, product_id, quantity) VALUES (?1, ?2, ?3)
         ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = quantity + excluded.quantity",
    )
    .bind(user_id)
    .bind(product_id)
    .bind(quantity)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn remove_item(pool: &SqlitePool, user_id: i64, product_id: i64) -> Result<(), AppError> {
    let removed = sqlx::query("DELETE FROM cart_items WHERE user_id = ?1 AND product_id = ?2")
        .bind(user_id)
        .bind(product_id)
        .execute(pool)
        .await?
        .rows_affected();

    if removed == 0 {
        return Err(AppError::NotFound("cart item"));
    }

    Ok(())
}

pub async fn clear(pool: &SqlitePool, user_id: i64) -> Result<(), AppError> {
    sqlx::query("DELETE FROM cart_items WHERE user_id = ?1")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<AddToCart>,
) -> Result<Json<CartView>, AppError> {
    let quantity = req.quantity.unwrap_or(1);

    if quantity < 1 {
        return Err(AppError::Validation(vec![
            "quantity must be at least 1".to_string(),
        ]));
    }

    add_item(&state.pool, user.id, req.product_id, quantity).await?;

    view(&state.pool, user.id).await.map(Json)
}

pub async fn view_cart(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<CartView>, AppError> {
    view(&state.pool, user.id).await.map(Json)
}

pub async fn remove_from_cart(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(product_id): Path<i64>,
) -> Result<Json<CartView>, AppError> {
    remove_item(&state.pool, user.id, product_id).await?;

    view(&state.pool, user.id).await.map(Json)
}

pub async fn clear_cart(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<CartView>, AppError> {
    clear(&state.pool, user.id).await?;

    view(&state.pool, user.id).await.map(Json)
}
