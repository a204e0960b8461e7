use async_trait::async_trait;
use common::{OrderId, PartId, TransactionId, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::OrderStore;
use crate::error::{Result, StoreError};
use crate::order::{Money, Order, OrderStatus, PaymentMethod};

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let payment_method: String = row.try_get("payment_method")?;
        let part_ids: Vec<Uuid> = row.try_get("part_ids")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            part_ids: part_ids.into_iter().map(PartId::from_uuid).collect(),
            total_price: Money::from_cents(row.try_get("total_price_cents")?),
            payment_method: payment_method
                .parse::<PaymentMethod>()
                .map_err(|e| StoreError::Corrupted(e.to_string()))?,
            transaction_id: row
                .try_get::<Option<Uuid>, _>("transaction_id")?
                .map(TransactionId::from_uuid),
            status: status
                .parse::<OrderStatus>()
                .map_err(|e| StoreError::Corrupted(e.to_string()))?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create(&self, order: &Order) -> Result<OrderId> {
        let part_ids: Vec<Uuid> = order.part_ids.iter().map(PartId::as_uuid).collect();

        sqlx::query(
            r#"
            INSERT INTO orders (order_id, user_id, part_ids, total_price_cents, payment_method,
                                transaction_id, status, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(&part_ids)
        .bind(order.total_price.cents())
        .bind(order.payment_method.as_str())
        .bind(order.transaction_id.map(|t| t.as_uuid()))
        .bind(order.status.as_str())
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("orders_pkey")
            {
                return StoreError::AlreadyExists(order.id);
            }
            StoreError::Database(e)
        })?;

        Ok(order.id)
    }

    async fn get(&self, id: OrderId) -> Result<Order> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT order_id, user_id, part_ids, total_price_cents, payment_method,
                   transaction_id, status, version, created_at, updated_at
            FROM orders
            WHERE order_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order)
            .unwrap_or(Err(StoreError::NotFound(id)))
    }

    #[tracing::instrument(skip(self, order), fields(order_id = %order.id, status = %order.status))]
    async fn update(&self, order: &mut Order) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET payment_method = $2, transaction_id = $3, status = $4,
                version = version + 1, updated_at = $5
            WHERE order_id = $1 AND version = $6
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.payment_method.as_str())
        .bind(order.transaction_id.map(|t| t.as_uuid()))
        .bind(order.status.as_str())
        .bind(order.updated_at)
        .bind(order.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current: Option<i64> =
                sqlx::query_scalar("SELECT version FROM orders WHERE order_id = $1")
                    .bind(order.id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await?;

            return Err(match current {
                None => StoreError::NotFound(order.id),
                Some(actual) => StoreError::VersionConflict {
                    order_id: order.id,
                    expected: order.version,
                    actual,
                },
            });
        }

        order.version += 1;
        Ok(())
    }
}
