use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

use super::repository::OrderRepository;
use crate::domain::order::{store_timestamp, NewOrder, OrderError, OrderRecord, OrderStatus};

// ============================================================================
// SQLite Order Repository
// ============================================================================
//
// One database file per node. Uniqueness of `order_id` is enforced by the
// table's UNIQUE constraint, so concurrent creates race inside SQLite and the
// loser observes a constraint violation, mapped to Conflict. Each create is a
// single INSERT statement: a failure leaves no row behind.
//
// Timestamps are stored as unix microseconds.
//
// ============================================================================

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id TEXT NOT NULL UNIQUE,
    customer_name TEXT NOT NULL,
    region TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'received',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)";

/// Applied to every pooled connection.
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const SELECT_COLUMNS: &str =
    "SELECT id, order_id, customer_name, region, status, created_at, updated_at FROM orders";

#[derive(Clone)]
pub struct SqliteOrderRepository {
    pool: SqlitePool,
}

impl SqliteOrderRepository {
    /// Open (creating if missing) the database at `url` and ensure the schema.
    ///
    /// `sqlite::memory:` is accepted; the pool is then pinned to a single
    /// long-lived connection so the database outlives individual queries.
    pub async fn connect(url: &str) -> Result<Self, OrderError> {
        let in_memory = url.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;

        sqlx::query(SCHEMA).execute(&pool).await?;

        tracing::info!(url = %url, "Order store ready (SQLite)");
        Ok(Self { pool })
    }

    fn decode(row: &SqliteRow) -> Result<OrderRecord, OrderError> {
        let status: String = row.try_get("status")?;
        let status = OrderStatus::from_str(&status).map_err(OrderError::Persistence)?;

        Ok(OrderRecord {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            customer_name: row.try_get("customer_name")?,
            region: row.try_get("region")?,
            status,
            created_at: from_micros(row.try_get("created_at")?)?,
            updated_at: from_micros(row.try_get("updated_at")?)?,
        })
    }
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, OrderError> {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or_else(|| OrderError::Persistence(format!("timestamp out of range: {}", micros)))
}

#[async_trait]
impl OrderRepository for SqliteOrderRepository {
    async fn create(&self, order: NewOrder) -> Result<OrderRecord, OrderError> {
        let now = store_timestamp();

        let result = sqlx::query(
            "INSERT INTO orders (order_id, customer_name, region, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&order.order_id)
        .bind(&order.customer_name)
        .bind(&order.region)
        .bind(OrderStatus::Received.as_str())
        .bind(now.timestamp_micros())
        .bind(now.timestamp_micros())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(OrderRecord {
                id: done.last_insert_rowid(),
                order_id: order.order_id,
                customer_name: order.customer_name,
                region: order.region,
                status: OrderStatus::Received,
                created_at: now,
                updated_at: now,
            }),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(OrderError::Conflict(order.order_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, order_id: &str) -> Result<Option<OrderRecord>, OrderError> {
        let row = sqlx::query(&format!("{} WHERE order_id = ?", SELECT_COLUMNS))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn list(&self) -> Result<Vec<OrderRecord>, OrderError> {
        let rows = sqlx::query(&format!("{} ORDER BY created_at ASC, id ASC", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::decode).collect()
    }

    async fn count(&self) -> Result<u64, OrderError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn update_status(&self, order_id: &str, status: OrderStatus) -> Result<OrderRecord, OrderError> {
        let current = self
            .get(order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;

        if !current.status.can_transition_to(status) {
            return Err(OrderError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }

        // Compare-and-set on the status we validated against; a concurrent
        // writer that got there first makes this a no-op.
        let now = store_timestamp();
        let done = sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE order_id = ? AND status = ?")
            .bind(status.as_str())
            .bind(now.timestamp_micros())
            .bind(order_id)
            .bind(current.status.as_str())
            .execute(&self.pool)
            .await?;

        if done.rows_affected() == 0 {
            let latest = self
                .get(order_id)
                .await?
                .ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;
            return Err(OrderError::InvalidTransition {
                from: latest.status,
                to: status,
            });
        }

        Ok(OrderRecord {
            status,
            updated_at: now,
            ..current
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn memory_repo() -> SqliteOrderRepository {
        SqliteOrderRepository::connect("sqlite::memory:").await.unwrap()
    }

    fn new_order(order_id: &str, region: &str) -> NewOrder {
        NewOrder {
            order_id: order_id.to_string(),
            customer_name: "Tran Thi B".to_string(),
            region: region.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_then_get_round_trips() {
        let repo = memory_repo().await;
        let created = repo.create(new_order("A1", "HCM")).await.unwrap();
        let fetched = repo.get("A1").await.unwrap().unwrap();

        assert_eq!(created, fetched);
        assert_eq!(fetched.status, OrderStatus::Received);
    }

    #[tokio::test]
    async fn test_unique_constraint_maps_to_conflict() {
        let repo = memory_repo().await;
        repo.create(new_order("A1", "HCM")).await.unwrap();

        let err = repo.create(new_order("A1", "HN")).await.unwrap_err();
        assert!(matches!(err, OrderError::Conflict(_)));

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].region, "HCM");
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_yield_one_success() {
        let repo = Arc::new(memory_repo().await);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.create(new_order("SAME", "DN")).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_creation() {
        let repo = memory_repo().await;
        for id in ["A1", "A2", "A3"] {
            repo.create(new_order(id, "HN")).await.unwrap();
        }

        let ids: Vec<String> = repo.list().await.unwrap().into_iter().map(|r| r.order_id).collect();
        assert_eq!(ids, vec!["A1", "A2", "A3"]);
    }

    #[tokio::test]
    async fn test_status_update_persists() {
        let repo = memory_repo().await;
        repo.create(new_order("A1", "HCM")).await.unwrap();

        let updated = repo.update_status("A1", OrderStatus::Processing).await.unwrap();
        let fetched = repo.get("A1").await.unwrap().unwrap();
        assert_eq!(updated, fetched);

        let err = repo.update_status("A1", OrderStatus::Received).await.unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_busy_timeout_reaches_every_pooled_connection() {
        let path = std::env::temp_dir().join(format!("orders_{}.db", uuid::Uuid::new_v4()));
        let repo = SqliteOrderRepository::connect(&format!("sqlite://{}", path.display()))
            .await
            .unwrap();

        // Holding each connection forces the pool to open a fresh one.
        let mut held = Vec::new();
        for _ in 0..3 {
            let mut conn = repo.pool.acquire().await.unwrap();
            let timeout: i64 = sqlx::query_scalar("PRAGMA busy_timeout")
                .fetch_one(&mut *conn)
                .await
                .unwrap();
            assert_eq!(timeout, 5000);
            held.push(conn);
        }

        drop(held);
        repo.pool.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }
}
