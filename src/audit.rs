//! Append-only trail of user actions. Entries are written on registration,
//! login/logout, product views, purchases and order status changes, and are
//! never updated or deleted. Analytics aggregates over this table.
use std::sync::Arc;

use axum::{Json, extract::Query, extract::State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{auth::AdminUser, error::AppError, models::AuditLogEntry, state::AppState};

pub const PAGE_SIZE: i64 = 50;

pub async fn record(
    pool: &SqlitePool,
    user_id: Option<i64>,
    action: &str,
    product_id: Option<i64>,
    detail: Option<String>,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO user_logs (user_id, action, product_id, detail, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(user_id)
    .bind(action)
    .bind(product_id)
    .bind(detail)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(Deserialize)]
pub struct LogsQuery {
    page: Option<i64>,
}

#[derive(Serialize)]
pub struct LogsPage {
    pub entries: Vec<AuditLogEntry>,
    pub page: i64,
    pub total_pages: i64,
}

pub async fn view_logs(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsPage>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * PAGE_SIZE;

    let entries = sqlx::query_as::<_, AuditLogEntry>(
        "SELECT l.id, l.user_id, u.username, l.action, l.product_id, l.detail, l.created_at
         FROM user_logs l
         LEFT JOIN users u ON u.id = l.user_id
         ORDER BY l.created_at DESC, l.id DESC
         LIMIT ?1 OFFSET ?2",
    )
    .bind(PAGE_SIZE)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_logs")
        .fetch_one(&state.pool)
        .await?;
    let total_pages = (total + PAGE_SIZE - 1) / PAGE_SIZE;

    Ok(Json(LogsPage {
        entries,
        page,
        total_pages,
    }))
}
