//! Admin surface: product CRUD, order management, user overview and the
//! analytics views. Every handler takes [`AdminUser`], which re-checks the
//! admin flag against the users table on each request.
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

use crate::{
    auth::AdminUser,
    error::AppError,
    models::{Order, OrderStatus, Product},
    orders,
    state::AppState,
};

#[derive(Deserialize)]
pub struct ProductForm {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub stock: i64,
    pub category: Option<String>,
    pub is_active: Option<bool>,
}

fn validate_product(form: &ProductForm) -> Result<(), AppError> {
    let mut errors = Vec::new();

    if form.name.trim().is_empty() {
        errors.push("name must not be empty".to_string());
    }
    if form.price_cents <= 0 {
        errors.push("price must be positive".to_string());
    }
    if form.stock < 0 {
        errors.push("stock must not be negative".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

#[derive(Deserialize)]
pub struct ProductFilter {
    search: Option<String>,
    category: Option<String>,
}

pub async fn list_products(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<Vec<Product>>, AppError> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM products WHERE 1 = 1");

    if let Some(search) = filter.search.filter(|s| !s.is_empty()) {
        let pattern = format!("%{search}%");
        qb.push(" AND (name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR description LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(category) = filter.category.filter(|c| !c.is_empty()) {
        qb.push(" AND category = ").push_bind(category);
    }
    qb.push(" ORDER BY name");

    let products = qb
        .build_query_as::<Product>()
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(products))
}

pub async fn create_product(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(form): Json<ProductForm>,
) -> Result<Json<Product>, AppError> {
    validate_product(&form)?;

    let product = sqlx::query_as::<_, Product>(
        "INSERT INTO products (name, description, price_cents, stock, category, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         RETURNING *",
    )
    .bind(form.name.trim())
    .bind(form.description.unwrap_or_default())
    .bind(form.price_cents)
    .bind(form.stock)
    .bind(&form.category)
    .bind(form.is_active.unwrap_or(true))
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(product))
}

pub async fn update_product(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(product_id): Path<i64>,
    Json(form): Json<ProductForm>,
) -> Result<Json<Product>, AppError> {
    validate_product(&form)?;

    let product = sqlx::query_as::<_, Product>(
        "UPDATE products
         SET name = ?2, description = ?3, price_cents = ?4, stock = ?5,
             category = ?6, is_active = ?7
         WHERE id = ?1
         RETURNING *",
    )
    .bind(product_id)
    .bind(form.name.trim())
    .bind(form.description.unwrap_or_default())
    .bind(form.price_cents)
    .bind(form.stock)
    .bind(&form.category)
    .bind(form.is_active.unwrap_or(true))
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("product"))?;

    Ok(Json(product))
}

#[derive(Debug, Serialize)]
pub struct DeleteOutcome {
    pub deleted: bool,
    pub deactivated: bool,
}

/// Removes a product. Products referenced by order history cannot be hard
/// deleted; those are deactivated instead so old orders stay readable.
pub async fn remove_product(
    pool: &sqlx::SqlitePool,
    product_id: i64,
) -> Result<DeleteOutcome, AppError> {
    let referenced: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM order_items WHERE product_id = ?1")
            .bind(product_id)
            .fetch_one(pool)
            .await?;

    if referenced > 0 {
        let changed = sqlx::query("UPDATE products SET is_active = 0 WHERE id = ?1")
            .bind(product_id)
            .execute(pool)
            .await?
            .rows_affected();

        if changed == 0 {
            return Err(AppError::NotFound("product"));
        }

        return Ok(DeleteOutcome {
            deleted: false,
            deactivated: true,
        });
    }

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM cart_items WHERE product_id = ?1")
        .bind(product_id)
        .execute(&mut *tx)
        .await?;

    let deleted = sqlx::query("DELETE FROM products WHERE id = ?1")
        .bind(product_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if deleted == 0 {
        tx.rollback().await?;
        return Err(AppError::NotFound("product"));
    }

    tx.commit().await?;

    Ok(DeleteOutcome {
        deleted: true,
        deactivated: false,
    })
}

pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(product_id): Path<i64>,
) -> Result<Json<DeleteOutcome>, AppError> {
    remove_product(&state.pool, product_id).await.map(Json)
}

#[derive(Deserialize)]
pub struct OrderFilter {
    status: Option<String>,
    search: Option<String>,
}

#[derive(Serialize, sqlx::FromRow)]
pub struct AdminOrderRow {
    pub id: i64,
    pub order_number: String,
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<Vec<AdminOrderRow>>, AppError> {
    let status = filter
        .status
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<OrderStatus>()
                .map_err(|e| AppError::Validation(vec![e]))
        })
        .transpose()?;

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT o.id, o.order_number, o.user_id, u.username, u.email,
                o.total_cents, o.status, o.created_at
         FROM orders o
         JOIN users u ON u.id = o.user_id
         WHERE 1 = 1",
    );

    if let Some(status) = status {
        qb.push(" AND o.status = ").push_bind(status.as_str());
    }
    if let Some(search) = filter.search.filter(|s| !s.is_empty()) {
        let pattern = format!("%{search}%");
        qb.push(" AND (o.order_number LIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.username LIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.email LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    qb.push(" ORDER BY o.created_at DESC, o.id DESC");

    let rows = qb
        .build_query_as::<AdminOrderRow>()
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(rows))
}

#[derive(Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(order_id): Path<i64>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<Order>, AppError> {
    let next = update
        .status
        .parse::<OrderStatus>()
        .map_err(|e| AppError::Validation(vec![e]))?;

    orders::transition_status(&state.pool, order_id, next)
        .await
        .map(Json)
}

#[derive(Deserialize)]
pub struct UserFilter {
    search: Option<String>,
}

#[derive(Serialize, sqlx::FromRow)]
pub struct AdminUserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub order_count: i64,
    pub total_spent_cents: i64,
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Vec<AdminUserRow>>, AppError> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT u.id, u.username, u.email, u.full_name, u.is_admin, u.created_at,
                COUNT(o.id) AS order_count,
                COALESCE(SUM(o.total_cents), 0) AS total_spent_cents
         FROM users u
         LEFT JOIN orders o ON o.user_id = u.id",
    );

    if let Some(search) = filter.search.filter(|s| !s.is_empty()) {
        let pattern = format!("%{search}%");
        qb.push(" WHERE (u.username LIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.email LIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.full_name LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    qb.push(" GROUP BY u.id ORDER BY u.created_at DESC");

    let rows = qb
        .build_query_as::<AdminUserRow>()
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(rows))
}

#[derive(Serialize)]
pub struct Dashboard {
    pub total_users: i64,
    pub total_products: i64,
    pub total_orders: i64,
    pub today_orders: i64,
    pub weekly_revenue_cents: i64,
    pub pending_orders: i64,
    pub recent_orders: Vec<AdminOrderRow>,
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<Dashboard>, AppError> {
    let pool = &state.pool;
    let week_ago = Utc::now() - Duration::days(7);

    let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    let total_products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(pool)
        .await?;
    let total_orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(pool)
        .await?;
    let today_orders: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE DATE(created_at) = DATE('now')")
            .fetch_one(pool)
            .await?;
    let weekly_revenue_cents: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(total_cents), 0) FROM orders WHERE created_at >= ?1",
    )
    .bind(week_ago)
    .fetch_one(pool)
    .await?;
    let pending_orders: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE status = ?1")
            .bind(OrderStatus::Pending)
            .fetch_one(pool)
            .await?;

    let recent_orders = sqlx::query_as::<_, AdminOrderRow>(
        "SELECT o.id, o.order_number, o.user_id, u.username, u.email,
                o.total_cents, o.status, o.created_at
         FROM orders o
         JOIN users u ON u.id = o.user_id
         ORDER BY o.created_at DESC, o.id DESC
         LIMIT 10",
    )
    .fetch_all(pool)
    .await?;

    Ok(Json(Dashboard {
        total_users,
        total_products,
        total_orders,
        today_orders,
        weekly_revenue_cents,
        pending_orders,
        recent_orders,
    }))
}

#[derive(Deserialize)]
pub struct AnalyticsQuery {
    range: Option<String>,
}

#[derive(Serialize, sqlx::FromRow)]
pub struct SalesPoint {
    pub day: String,
    pub order_count: i64,
    pub revenue_cents: i64,
    pub avg_order_cents: f64,
}

#[derive(Serialize, sqlx::FromRow)]
pub struct GrowthPoint {
    pub day: String,
    pub new_users: i64,
}

#[derive(Serialize, sqlx::FromRow)]
pub struct TopProduct {
    pub name: String,
    pub total_sold: i64,
    pub stock: i64,
}

#[derive(Serialize, sqlx::FromRow)]
pub struct TopCategory {
    pub category: String,
    pub order_count: i64,
    pub total_quantity: i64,
    pub revenue_cents: i64,
}

#[derive(Serialize, sqlx::FromRow)]
pub struct ActionStat {
    pub action: String,
    pub count: i64,
    pub unique_users: i64,
}

#[derive(Serialize)]
pub struct Analytics {
    pub range: String,
    pub sales_per_day: Vec<SalesPoint>,
    pub user_growth: Vec<GrowthPoint>,
    pub top_products: Vec<TopProduct>,
    pub top_categories: Vec<TopCategory>,
    pub user_actions: Vec<ActionStat>,
}

/// Read-only aggregations over a trailing window. Recomputed on every
/// request, nothing is cached.
pub async fn analytics(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<Analytics>, AppError> {
    let range = query.range.unwrap_or_else(|| "week".to_string());
    let days = match range.as_str() {
        "day" => 1,
        "month" => 30,
        "year" => 365,
        _ => 7,
    };
    let cutoff = Utc::now() - Duration::days(days);
    let pool = &state.pool;

    let sales_per_day = sqlx::query_as::<_, SalesPoint>(
        "SELECT DATE(created_at) AS day, COUNT(*) AS order_count,
                SUM(total_cents) AS revenue_cents, AVG(total_cents) AS avg_order_cents
         FROM orders
         WHERE created_at >= ?1
         GROUP BY DATE(created_at)
         ORDER BY day",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    let user_growth = sqlx::query_as::<_, GrowthPoint>(
        "SELECT DATE(created_at) AS day, COUNT(*) AS new_users
         FROM users
         WHERE created_at >= ?1
         GROUP BY DATE(created_at)
         ORDER BY day",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    let top_products = sqlx::query_as::<_, TopProduct>(
        "SELECT p.name, SUM(oi.quantity) AS total_sold, p.stock
         FROM order_items oi
         JOIN products p ON p.id = oi.product_id
         JOIN orders o ON o.id = oi.order_id
         WHERE o.created_at >= ?1
         GROUP BY p.id
         ORDER BY total_sold DESC
         LIMIT 10",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    let top_categories = sqlx::query_as::<_, TopCategory>(
        "SELECT p.category, COUNT(DISTINCT o.id) AS order_count,
                SUM(oi.quantity) AS total_quantity,
                SUM(oi.quantity * oi.price_cents) AS revenue_cents
         FROM order_items oi
         JOIN products p ON p.id = oi.product_id
         JOIN orders o ON o.id = oi.order_id
         WHERE o.created_at >= ?1 AND p.category IS NOT NULL
         GROUP BY p.category
         ORDER BY revenue_cents DESC
         LIMIT 10",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    let user_actions = sqlx::query_as::<_, ActionStat>(
        "SELECT action, COUNT(*) AS count, COUNT(DISTINCT user_id) AS unique_users
         FROM user_logs
         WHERE created_at >= ?1
         GROUP BY action
         ORDER BY count DESC",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    Ok(Json(Analytics {
        range,
        sales_per_day,
        user_growth,
        top_products,
        top_categories,
        user_actions,
    }))
}
