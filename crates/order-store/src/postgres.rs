use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use domain::{NewOrder, Order, OrderItem, OrderStatus, OrderUpdate};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{OrderId, OrderStoreError, Result, store::OrderStore};

const ORDER_COLUMNS: &str = "id, client_id, items, total, status, created_at, updated_at";

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and returns a store over a fresh pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let id = OrderId::from_uuid(row.try_get::<Uuid, _>("id")?);
        let items: Vec<OrderItem> = serde_json::from_value(row.try_get::<serde_json::Value, _>("items")?)?;
        let status: String = row.try_get("status")?;
        let status = OrderStatus::parse(&status).ok_or_else(|| OrderStoreError::Corrupt {
            id,
            reason: format!("unknown status {status:?}"),
        })?;

        Ok(Order {
            id,
            client_id: row.try_get("client_id")?,
            items,
            total: row.try_get("total")?,
            status,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Current time at the precision `TIMESTAMPTZ` stores.
    fn now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }

    fn record(operation: &'static str, started: Instant) {
        metrics::histogram!("order_store_query_duration_seconds", "operation" => operation)
            .record(started.elapsed().as_secs_f64());
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[tracing::instrument(skip(self))]
    async fn find_all(&self) -> Result<Vec<Order>> {
        let started = Instant::now();
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Self::record("find_all", started);

        rows.into_iter().map(Self::row_to_order).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        let started = Instant::now();
        let row: Option<PgRow> =
            sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        Self::record("find_by_id", started);

        row.map(Self::row_to_order).transpose()
    }

    #[tracing::instrument(skip(self, new_order), fields(client_id = %new_order.client_id))]
    async fn create(&self, new_order: NewOrder) -> Result<Order> {
        let order = Order::create(OrderId::new(), new_order, Self::now())?;
        let items = serde_json::to_value(&order.items)?;

        let started = Instant::now();
        sqlx::query(
            r#"
            INSERT INTO orders (id, client_id, items, total, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.client_id)
        .bind(items)
        .bind(order.total)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Self::record("create", started);

        Ok(order)
    }

    #[tracing::instrument(skip(self, update))]
    async fn update(&self, id: OrderId, update: OrderUpdate) -> Result<Option<Order>> {
        // Reject bad payloads before taking the row lock.
        update.validate()?;

        let started = Instant::now();
        let mut tx = self.pool.begin().await?;

        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut order = Self::row_to_order(row)?;
        order.apply_update(update, Self::now())?;
        let items = serde_json::to_value(&order.items)?;

        sqlx::query(
            r#"
            UPDATE orders
            SET client_id = $2, items = $3, total = $4, status = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.client_id)
        .bind(items)
        .bind(order.total)
        .bind(order.status.as_str())
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Self::record("update", started);

        Ok(Some(order))
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, id: OrderId) -> Result<bool> {
        let started = Instant::now();
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Self::record("delete", started);

        Ok(result.rows_affected() > 0)
    }
}
