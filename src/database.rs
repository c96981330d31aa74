//! # SQLite
//!
//! Single relational store behind every feature.
//!
//! ## Tables
//!
//! - `products`: catalog rows with price in integer cents, a stock counter
//!   and an `is_active` flag. Stock is only ever decremented through the
//!   conditional update in checkout, so it cannot go negative.
//! - `users`: account rows with a unique username and email and an Argon2id
//!   password hash. Rows are never deleted.
//! - `sessions`: cookie-token sessions (`id` is a UUID string). Only the
//!   user id and expiry live here; privilege is re-read from `users` on
//!   every request.
//! - `cart_items`: one row per (user, product), quantity accumulates.
//! - `orders` / `order_items`: immutable purchase records; `order_items`
//!   snapshots the price at purchase time.
//! - `user_logs`: append-only action trail feeding the analytics views.
//!
//! ## Notes
//!
//! - Money is integer cents throughout. REAL columns would make order
//!   totals drift from the sum of their lines.
//! - The schema is created on startup with `CREATE TABLE IF NOT EXISTS`;
//!   a fresh database is seeded with a small catalog and an admin account.
use std::str::FromStr;

use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tracing::{info, warn};

use crate::auth::hash_password;

pub async fn init_db(database_url: &str) -> SqlitePool {
    let options = SqliteConnectOptions::from_str(database_url)
        .expect("Invalid DATABASE_URL")
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .expect("Database misconfigured!");

    create_schema(&pool).await.expect("Schema creation failed");
    seed(&pool).await.expect("Database seeding failed");

    pool
}

pub async fn create_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            price_cents INTEGER NOT NULL,
            stock INTEGER NOT NULL DEFAULT 0,
            category TEXT,
            is_active INTEGER NOT NULL DEFAULT 1
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT UNIQUE NOT NULL,
            email TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            full_name TEXT,
            is_admin INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users (id),
            expires_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS cart_items (
            user_id INTEGER NOT NULL REFERENCES users (id),
            product_id INTEGER NOT NULL REFERENCES products (id),
            quantity INTEGER NOT NULL,
            PRIMARY KEY (user_id, product_id)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_number TEXT UNIQUE NOT NULL,
            user_id INTEGER NOT NULL REFERENCES users (id),
            total_cents INTEGER NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS order_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id INTEGER NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
            product_id INTEGER NOT NULL REFERENCES products (id),
            quantity INTEGER NOT NULL,
            price_cents INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER,
            action TEXT NOT NULL,
            product_id INTEGER,
            detail TEXT,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

const SEED_PRODUCTS: &[(&str, &str, i64, i64, &str)] = &[
    ("Aurora 14 Laptop", "14-inch ultrabook, 16 GB RAM, 512 GB SSD", 129_900, 30, "computers"),
    ("Titan Gaming Tower", "RTX-class GPU, liquid cooled", 219_900, 12, "computers"),
    ("Pixelbook Go 13", "Lightweight chromebook for travel", 64_900, 45, "computers"),
    ("Nimbus Phone X", "6.1-inch OLED, dual camera", 89_900, 80, "phones"),
    ("Nimbus Phone SE", "Compact 5.4-inch, all-day battery", 49_900, 120, "phones"),
    ("Vector Fold 5", "Folding display flagship", 149_900, 25, "phones"),
    ("Echo Buds Pro", "Active noise cancelling earbuds", 19_900, 200, "audio"),
    ("Studio Cans MK2", "Closed-back monitoring headphones", 34_900, 60, "audio"),
    ("Boom Mini Speaker", "Pocket bluetooth speaker, IP67", 7_900, 150, "audio"),
    ("Slate Tab 11", "11-inch tablet with stylus support", 59_900, 70, "tablets"),
    ("Slate Tab Mini", "8-inch reader-sized tablet", 32_900, 90, "tablets"),
    ("Summit 4K Monitor", "27-inch 4K IPS, USB-C 90 W", 42_900, 40, "displays"),
    ("Summit Ultrawide", "34-inch curved 144 Hz", 64_900, 22, "displays"),
];

/// Seeds a fresh database: a starter catalog plus a default admin account.
/// Runs only when the products table is empty.
async fn seed(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let product_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(pool)
        .await?;

    if product_count > 0 {
        return Ok(());
    }

    for (name, description, price_cents, stock, category) in SEED_PRODUCTS {
        sqlx::query(
            "INSERT INTO products (name, description, price_cents, stock, category)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(name)
        .bind(description)
        .bind(price_cents)
        .bind(stock)
        .bind(category)
        .execute(pool)
        .await?;
    }

    let admin_hash = hash_password("admin123").expect("Seeding admin password failed");

    sqlx::query(
        "INSERT INTO users (username, email, password_hash, full_name, is_admin, created_at)
         VALUES ('admin', 'admin@example.com', ?1, 'Administrator', 1, ?2)",
    )
    .bind(admin_hash)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    info!("Seeded {} products", SEED_PRODUCTS.len());
    warn!("Seeded default admin account (admin / admin123), change its password");

    Ok(())
}
