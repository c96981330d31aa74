//! # Order engine
//!
//! Converts a cart into an immutable order.
//!
//! ## Checkout
//!
//! The whole conversion runs inside one transaction. Each line decrements
//! stock with a conditional update (`... WHERE stock >= quantity`); a miss
//! rolls the transaction back, so two checkouts racing for the same unit
//! cannot both take it and stock never goes negative. Either every line
//! commits (order created, stock decremented, cart cleared) or none does.
//!
//! ## Lifecycle
//!
//! Orders are created as `pending` and only move along the edges
//! [`OrderStatus::can_transition_to`] allows. Line rows are never mutated
//! after creation; the price on each line is the catalog price at the
//! moment of purchase.
use std::sync::Arc;

use axum::{Json, extract::State};
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::{
    audit, cart,
    auth::AuthUser,
    error::AppError,
    models::{Order, OrderItem, OrderStatus, User},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Serialize)]
pub struct CheckoutSummary {
    pub user: User,
    pub items: Vec<cart::CartLine>,
    pub total_cents: i64,
}

async fn order_items(pool: &SqlitePool, order_id: i64) -> Result<Vec<OrderItem>, AppError> {
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT oi.id, oi.order_id, oi.product_id, p.name AS product_name,
                oi.quantity, oi.price_cents
         FROM order_items oi
         JOIN products p ON p.id = oi.product_id
         WHERE oi.order_id = ?1
         ORDER BY oi.id",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(items)
}

async fn fetch_order(pool: &SqlitePool, order_id: i64) -> Result<Order, AppError> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?1")
        .bind(order_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("order"))
}

/// Converts the user's cart into an order. Fails without side effects when
/// the cart is empty or any line exceeds current stock.
pub async fn place_order(pool: &SqlitePool, user: &User) -> Result<OrderDetail, AppError> {
    let lines = cart::cart_lines(pool, user.id).await?;

    if lines.is_empty() {
        return Err(AppError::EmptyCart);
    }

    let order_number = format!("ORD-{}", Uuid::new_v4().simple());

    let mut tx = pool.begin().await?;

    let order_id: i64 = sqlx::query_scalar(
        "INSERT INTO orders (order_number, user_id, total_cents, status, created_at)
         VALUES (?1, ?2, 0, ?3, ?4)
         RETURNING id",
    )
    .bind(&order_number)
    .bind(user.id)
    .bind(OrderStatus::Pending)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await?;

    let mut total_cents = 0;

    for line in &lines {
        let decremented =
            sqlx::query("UPDATE products SET stock = stock - ?2 WHERE id = ?1 AND stock >= ?2")
                .bind(line.product_id)
                .bind(line.quantity)
                .execute(&mut *tx)
                .await?
                .rows_affected();

        if decremented == 0 {
            tx.rollback().await?;
            return Err(AppError::InsufficientStock(line.name.clone()));
        }

        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, quantity, price_cents)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(order_id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.price_cents)
        .execute(&mut *tx)
        .await?;

        total_cents += line.price_cents * line.quantity;
    }

    sqlx::query("UPDATE orders SET total_cents = ?2 WHERE id = ?1")
        .bind(order_id)
        .bind(total_cents)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM cart_items WHERE user_id = ?1")
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    audit::record(
        pool,
        Some(user.id),
        "purchase",
        None,
        Some(format!("order {order_number}")),
    )
    .await?;

    info!("Order {order_number} placed by {}", user.username);

    let order = fetch_order(pool, order_id).await?;
    let items = order_items(pool, order_id).await?;

    Ok(OrderDetail { order, items })
}

/// Moves an order along the status graph, rejecting backward or skip-ahead
/// edges. Records the change in the audit trail.
pub async fn transition_status(
    pool: &SqlitePool,
    order_id: i64,
    next: OrderStatus,
) -> Result<Order, AppError> {
    let order = fetch_order(pool, order_id).await?;

    if !order.status.can_transition_to(next) {
        return Err(AppError::InvalidStatusTransition {
            from: order.status,
            to: next,
        });
    }

    sqlx::query("UPDATE orders SET status = ?2 WHERE id = ?1")
        .bind(order_id)
        .bind(next)
        .execute(pool)
        .await?;

    audit::record(
        pool,
        Some(order.user_id),
        "order_status_change",
        None,
        Some(format!(
            "order {}: {} -> {}",
            order.order_number, order.status, next
        )),
    )
    .await?;

    fetch_order(pool, order_id).await
}

pub async fn checkout_summary(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<CheckoutSummary>, AppError> {
    let cart = cart::view(&state.pool, user.id).await?;

    if cart.items.is_empty() {
        return Err(AppError::EmptyCart);
    }

    Ok(Json(CheckoutSummary {
        user,
        items: cart.items,
        total_cents: cart.total_cents,
    }))
}

pub async fn checkout(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<OrderDetail>, AppError> {
    place_order(&state.pool, &user).await.map(Json)
}

/// The user's orders, newest first, each with its lines.
pub async fn history(pool: &SqlitePool, user_id: i64) -> Result<Vec<OrderDetail>, AppError> {
    let orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut history = Vec::with_capacity(orders.len());
    for order in orders {
        let items = order_items(pool, order.id).await?;
        history.push(OrderDetail { order, items });
    }

    Ok(history)
}

pub async fn order_history(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<OrderDetail>>, AppError> {
    history(&state.pool, user.id).await.map(Json)
}
