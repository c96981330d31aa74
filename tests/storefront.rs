use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

use storefront::{
    admin, auth, cart, catalog, database,
    error::AppError,
    models::{OrderStatus, User},
    orders,
};

async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    database::create_schema(&pool).await.unwrap();

    pool
}

async fn insert_product(pool: &SqlitePool, name: &str, price_cents: i64, stock: i64) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO products (name, description, price_cents, stock, category)
         VALUES (?1, '', ?2, ?3, 'test') RETURNING id",
    )
    .bind(name)
    .bind(price_cents)
    .bind(stock)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn insert_user(pool: &SqlitePool, username: &str) -> User {
    sqlx::query_as(
        "INSERT INTO users (username, email, password_hash, is_admin, created_at)
         VALUES (?1, ?2, 'unused', 0, ?3) RETURNING *",
    )
    .bind(username)
    .bind(format!("{username}@example.com"))
    .bind(chrono::Utc::now())
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn stock_of(pool: &SqlitePool, product_id: i64) -> i64 {
    sqlx::query_scalar("SELECT stock FROM products WHERE id = ?1")
        .bind(product_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn count(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}

#[tokio::test]
async fn checkout_converts_cart_into_order() {
    let pool = test_pool().await;
    let user = insert_user(&pool, "alice").await;
    let a = insert_product(&pool, "Product A", 1_000, 5).await;
    let b = insert_product(&pool, "Product B", 2_500, 2).await;

    cart::add_item(&pool, user.id, a, 3).await.unwrap();
    cart::add_item(&pool, user.id, b, 2).await.unwrap();

    let detail = orders::place_order(&pool, &user).await.unwrap();

    assert_eq!(detail.order.status, OrderStatus::Pending);
    assert_eq!(detail.order.total_cents, 3 * 1_000 + 2 * 2_500);
    assert_eq!(detail.items.len(), 2);

    let line_sum: i64 = detail
        .items
        .iter()
        .map(|item| item.price_cents * item.quantity)
        .sum();
    assert_eq!(line_sum, detail.order.total_cents);

    assert_eq!(stock_of(&pool, a).await, 2);
    assert_eq!(stock_of(&pool, b).await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM cart_items").await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM orders").await, 1);
}

#[tokio::test]
async fn checkout_fails_without_partial_writes_on_insufficient_stock() {
    let pool = test_pool().await;
    let user = insert_user(&pool, "bob").await;
    let c = insert_product(&pool, "Product C", 9_900, 1).await;

    cart::add_item(&pool, user.id, c, 5).await.unwrap();

    let err = orders::place_order(&pool, &user).await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock(name) if name == "Product C"));

    assert_eq!(stock_of(&pool, c).await, 1);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM orders").await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM order_items").await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM cart_items").await, 1);
}

#[tokio::test]
async fn checkout_requires_a_non_empty_cart() {
    let pool = test_pool().await;
    let user = insert_user(&pool, "carol").await;

    let err = orders::place_order(&pool, &user).await.unwrap_err();
    assert!(matches!(err, AppError::EmptyCart));
}

#[tokio::test]
async fn racing_checkouts_cannot_oversell_the_last_unit() {
    let pool = test_pool().await;
    let first = insert_user(&pool, "dave").await;
    let second = insert_user(&pool, "erin").await;
    let d = insert_product(&pool, "Product D", 500, 1).await;

    cart::add_item(&pool, first.id, d, 1).await.unwrap();
    cart::add_item(&pool, second.id, d, 1).await.unwrap();

    let task_one = tokio::spawn({
        let pool = pool.clone();
        let user = first.clone();
        async move { orders::place_order(&pool, &user).await }
    });
    let task_two = tokio::spawn({
        let pool = pool.clone();
        let user = second.clone();
        async move { orders::place_order(&pool, &user).await }
    });

    let results = [task_one.await.unwrap(), task_two.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();

    assert_eq!(successes, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, AppError::InsufficientStock(_))));
    assert_eq!(stock_of(&pool, d).await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM orders").await, 1);
}

#[tokio::test]
async fn checkout_snapshots_the_price_at_purchase_time() {
    let pool = test_pool().await;
    let user = insert_user(&pool, "frank").await;
    let p = insert_product(&pool, "Product P", 1_000, 10).await;

    cart::add_item(&pool, user.id, p, 1).await.unwrap();
    let detail = orders::place_order(&pool, &user).await.unwrap();
    assert_eq!(detail.order.total_cents, 1_000);

    sqlx::query("UPDATE products SET price_cents = 9999 WHERE id = ?1")
        .bind(p)
        .execute(&pool)
        .await
        .unwrap();

    let history = orders::history(&pool, user.id).await.unwrap();
    assert_eq!(history[0].items[0].price_cents, 1_000);
    assert_eq!(history[0].order.total_cents, 1_000);
}

#[tokio::test]
async fn cart_accumulates_quantity_per_product() {
    let pool = test_pool().await;
    let user = insert_user(&pool, "grace").await;
    let p = insert_product(&pool, "Product P", 1_000, 10).await;

    cart::add_item(&pool, user.id, p, 1).await.unwrap();
    cart::add_item(&pool, user.id, p, 2).await.unwrap();

    let view = cart::view(&pool, user.id).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 3);
    assert_eq!(view.total_cents, 3_000);
}

#[tokio::test]
async fn adding_unknown_or_inactive_products_is_a_silent_no_op() {
    let pool = test_pool().await;
    let user = insert_user(&pool, "heidi").await;
    let p = insert_product(&pool, "Product P", 1_000, 10).await;

    sqlx::query("UPDATE products SET is_active = 0 WHERE id = ?1")
        .bind(p)
        .execute(&pool)
        .await
        .unwrap();

    cart::add_item(&pool, user.id, 424_242, 1).await.unwrap();
    cart::add_item(&pool, user.id, p, 1).await.unwrap();

    let view = cart::view(&pool, user.id).await.unwrap();
    assert!(view.items.is_empty());
}

#[tokio::test]
async fn cart_remove_and_clear() {
    let pool = test_pool().await;
    let user = insert_user(&pool, "ivan").await;
    let a = insert_product(&pool, "Product A", 1_000, 10).await;
    let b = insert_product(&pool, "Product B", 2_000, 10).await;

    cart::add_item(&pool, user.id, a, 1).await.unwrap();
    cart::add_item(&pool, user.id, b, 1).await.unwrap();

    cart::remove_item(&pool, user.id, a).await.unwrap();
    let view = cart::view(&pool, user.id).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].product_id, b);

    let err = cart::remove_item(&pool, user.id, a).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    cart::clear(&pool, user.id).await.unwrap();
    assert!(cart::view(&pool, user.id).await.unwrap().items.is_empty());
}

#[tokio::test]
async fn registration_collects_every_violation() {
    let pool = test_pool().await;

    let err = auth::register_user(
        &pool,
        &auth::RegisterRequest {
            username: "ab".to_string(),
            email: "not-an-email".to_string(),
            password: "12345".to_string(),
            confirm_password: "54321".to_string(),
            full_name: None,
        },
    )
    .await
    .unwrap_err();

    match err {
        AppError::Validation(messages) => assert_eq!(messages.len(), 4),
        other => panic!("expected validation error, got {other:?}"),
    }

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM users").await, 0);
}

#[tokio::test]
async fn registration_rejects_password_mismatch_without_creating_a_user() {
    let pool = test_pool().await;

    let err = auth::register_user(
        &pool,
        &auth::RegisterRequest {
            username: "judy".to_string(),
            email: "judy@example.com".to_string(),
            password: "secret1".to_string(),
            confirm_password: "secret2".to_string(),
            full_name: None,
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM users").await, 0);
}

#[tokio::test]
async fn registration_rejects_duplicate_username_and_email() {
    let pool = test_pool().await;

    let request = auth::RegisterRequest {
        username: "kevin".to_string(),
        email: "kevin@example.com".to_string(),
        password: "secret1".to_string(),
        confirm_password: "secret1".to_string(),
        full_name: None,
    };

    auth::register_user(&pool, &request).await.unwrap();
    let err = auth::register_user(&pool, &request).await.unwrap_err();

    match err {
        AppError::Validation(messages) => {
            assert!(messages.iter().any(|m| m.contains("username")));
            assert!(messages.iter().any(|m| m.contains("email")));
        }
        other => panic!("expected validation error, got {other:?}"),
    }

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM users").await, 1);
}

#[tokio::test]
async fn login_accepts_username_or_email_and_rejects_everything_else() {
    let pool = test_pool().await;

    auth::register_user(
        &pool,
        &auth::RegisterRequest {
            username: "laura".to_string(),
            email: "laura@example.com".to_string(),
            password: "secret1".to_string(),
            confirm_password: "secret1".to_string(),
            full_name: None,
        },
    )
    .await
    .unwrap();

    assert!(auth::authenticate(&pool, "laura", "secret1").await.is_ok());
    assert!(
        auth::authenticate(&pool, "laura@example.com", "secret1")
            .await
            .is_ok()
    );

    let wrong = auth::authenticate(&pool, "laura", "wrong").await.unwrap_err();
    assert!(matches!(wrong, AppError::InvalidCredentials));

    let unknown = auth::authenticate(&pool, "nobody", "secret1").await.unwrap_err();
    assert!(matches!(unknown, AppError::InvalidCredentials));
}

#[tokio::test]
async fn referenced_products_degrade_to_soft_delete() {
    let pool = test_pool().await;
    let user = insert_user(&pool, "mallory").await;
    let p = insert_product(&pool, "Product P", 1_000, 10).await;

    cart::add_item(&pool, user.id, p, 1).await.unwrap();
    orders::place_order(&pool, &user).await.unwrap();

    let outcome = admin::remove_product(&pool, p).await.unwrap();
    assert!(!outcome.deleted);
    assert!(outcome.deactivated);

    // Hidden from browse, still present for order history.
    let browsable = catalog::active_products(&pool, None).await.unwrap();
    assert!(browsable.iter().all(|product| product.id != p));

    let history = orders::history(&pool, user.id).await.unwrap();
    assert_eq!(history[0].items[0].product_name, "Product P");
}

#[tokio::test]
async fn unreferenced_products_hard_delete_and_leave_carts_consistent() {
    let pool = test_pool().await;
    let user = insert_user(&pool, "niaj").await;
    let p = insert_product(&pool, "Product P", 1_000, 10).await;

    cart::add_item(&pool, user.id, p, 1).await.unwrap();

    let outcome = admin::remove_product(&pool, p).await.unwrap();
    assert!(outcome.deleted);
    assert!(!outcome.deactivated);

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM products").await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM cart_items").await, 0);

    let missing = admin::remove_product(&pool, p).await.unwrap_err();
    assert!(matches!(missing, AppError::NotFound(_)));
}

#[tokio::test]
async fn order_status_moves_forward_only() {
    let pool = test_pool().await;
    let user = insert_user(&pool, "oscar").await;
    let p = insert_product(&pool, "Product P", 1_000, 10).await;

    cart::add_item(&pool, user.id, p, 1).await.unwrap();
    let detail = orders::place_order(&pool, &user).await.unwrap();
    let order_id = detail.order.id;

    // Skip-ahead is rejected.
    let err = orders::transition_status(&pool, order_id, OrderStatus::Shipped)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStatusTransition { .. }));

    let paid = orders::transition_status(&pool, order_id, OrderStatus::Paid)
        .await
        .unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);

    // Backward is rejected.
    let err = orders::transition_status(&pool, order_id, OrderStatus::Pending)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStatusTransition { .. }));

    let cancelled = orders::transition_status(&pool, order_id, OrderStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    // Terminal.
    let err = orders::transition_status(&pool, order_id, OrderStatus::Paid)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStatusTransition { .. }));
}

#[tokio::test]
async fn purchases_and_status_changes_land_in_the_audit_trail() {
    let pool = test_pool().await;
    let user = insert_user(&pool, "peggy").await;
    let p = insert_product(&pool, "Product P", 1_000, 10).await;

    cart::add_item(&pool, user.id, p, 1).await.unwrap();
    let detail = orders::place_order(&pool, &user).await.unwrap();
    orders::transition_status(&pool, detail.order.id, OrderStatus::Paid)
        .await
        .unwrap();

    assert_eq!(
        count(
            &pool,
            "SELECT COUNT(*) FROM user_logs WHERE action = 'purchase'"
        )
        .await,
        1
    );
    assert_eq!(
        count(
            &pool,
            "SELECT COUNT(*) FROM user_logs WHERE action = 'order_status_change'"
        )
        .await,
        1
    );
}
