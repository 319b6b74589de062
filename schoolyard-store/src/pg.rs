//! PostgreSQL backend.
//!
//! Documents live in a single `collection_documents` table: open JSON payload
//! in a JSONB column, keyed by `(collection, id)`. Filters compile to
//! parameterized WHERE clauses over the JSONB payload; field names are always
//! bound as parameters, never interpolated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use schoolyard_core::{
    merge_update, new_document_id, now_rfc3339, stamp_new, CoreResult, Document, Filter, FilterOp,
    QuerySpec, SortOrder, StorageError, CREATED_AT,
};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio_postgres::types::{Json, ToSql};
use tokio_postgres::{GenericClient, NoTls};

use crate::backend::{value_text, CollectionStats, DocumentBackend};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// PostgreSQL connection pool configuration.
#[derive(Debug, Clone)]
pub struct PgConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "schoolyard".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl PgConfig {
    /// Create a configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("SCHOOLYARD_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("SCHOOLYARD_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("SCHOOLYARD_DB_NAME")
                .unwrap_or_else(|_| "schoolyard".to_string()),
            user: std::env::var("SCHOOLYARD_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("SCHOOLYARD_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("SCHOOLYARD_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("SCHOOLYARD_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> CoreResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StorageError::backend(format!("failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS collection_documents (
    collection  TEXT        NOT NULL,
    id          TEXT        NOT NULL,
    data        JSONB       NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (collection, id)
);
CREATE INDEX IF NOT EXISTS idx_documents_collection
    ON collection_documents (collection);
CREATE INDEX IF NOT EXISTS idx_documents_created
    ON collection_documents (collection, created_at);
CREATE INDEX IF NOT EXISTS idx_documents_updated
    ON collection_documents (collection, updated_at);
";

// ============================================================================
// FILTER COMPILATION
// ============================================================================

/// Compile filters into WHERE clauses and their bound parameters.
///
/// Placeholders start at `$start`; the caller owns the earlier ones.
fn compile_filters(
    filters: &[Filter],
    start: usize,
) -> (Vec<String>, Vec<Box<dyn ToSql + Sync + Send>>) {
    let mut clauses = Vec::with_capacity(filters.len());
    let mut params: Vec<Box<dyn ToSql + Sync + Send>> = Vec::new();
    let mut n = start;

    for filter in filters {
        match filter.op {
            FilterOp::Eq => {
                clauses.push(format!("data -> ${} = ${}", n, n + 1));
                params.push(Box::new(filter.field.clone()));
                params.push(Box::new(Json(filter.value.clone())));
                n += 2;
            }
            FilterOp::Ne => {
                // A missing field matches nothing, so require presence.
                clauses.push(format!("(data ? ${} AND data -> ${} <> ${})", n, n, n + 1));
                params.push(Box::new(filter.field.clone()));
                params.push(Box::new(Json(filter.value.clone())));
                n += 2;
            }
            FilterOp::Lt | FilterOp::Lte | FilterOp::Gt | FilterOp::Gte => {
                clauses.push(format!(
                    "data ->> ${} {} ${}",
                    n,
                    filter.op.symbol(),
                    n + 1
                ));
                params.push(Box::new(filter.field.clone()));
                params.push(Box::new(value_text(&filter.value)));
                n += 2;
            }
            FilterOp::In => {
                let options: Vec<String> = filter
                    .value
                    .as_array()
                    .map(|arr| arr.iter().map(value_text).collect())
                    .unwrap_or_default();
                clauses.push(format!("data ->> ${} = ANY(${})", n, n + 1));
                params.push(Box::new(filter.field.clone()));
                params.push(Box::new(options));
                n += 2;
            }
            FilterOp::Contains => {
                clauses.push(format!("data ->> ${} LIKE ${}", n, n + 1));
                params.push(Box::new(filter.field.clone()));
                params.push(Box::new(format!("%{}%", value_text(&filter.value))));
                n += 2;
            }
        }
    }

    (clauses, params)
}

fn where_sql(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" AND {}", clauses.join(" AND "))
    }
}

fn as_refs(params: &[Box<dyn ToSql + Sync + Send>]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

fn db_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::backend(e)
}

fn row_document(row: &tokio_postgres::Row) -> CoreResult<Document> {
    let id: String = row.get("id");
    let Json(data): Json<Value> = row.get("data");
    let map = match data {
        Value::Object(map) => map,
        other => {
            return Err(StorageError::Serialization {
                reason: format!("document payload is not an object: {}", other),
            }
            .into())
        }
    };
    Ok(Document::new(id, map))
}

// ============================================================================
// BACKEND
// ============================================================================

/// Production backend over a deadpool-postgres pool.
#[derive(Clone)]
pub struct PgBackend {
    pool: Pool,
}

impl PgBackend {
    /// Wrap an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a backend from configuration.
    pub fn from_config(config: &PgConfig) -> CoreResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Create the documents table and its indexes if they don't exist.
    pub async fn init_schema(&self) -> CoreResult<()> {
        let conn = self.conn().await?;
        conn.batch_execute(SCHEMA_SQL).await.map_err(db_err)?;
        tracing::info!("document schema ready");
        Ok(())
    }

    async fn conn(&self) -> CoreResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            StorageError::PoolExhausted {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Stamp, serialize, and insert one document on the given client.
    /// Shared by `create` and `batch_create`.
    async fn insert_document<C: GenericClient>(
        client: &C,
        collection: &str,
        mut data: Map<String, Value>,
        id: Option<String>,
        now: &str,
        now_ts: DateTime<Utc>,
    ) -> CoreResult<String> {
        let id = id.unwrap_or_else(new_document_id);
        stamp_new(&mut data, now);

        let inserted = client
            .execute(
                "INSERT INTO collection_documents (collection, id, data, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (collection, id) DO NOTHING",
                &[
                    &collection,
                    &id,
                    &Json(Value::Object(data)),
                    &now_ts,
                    &now_ts,
                ],
            )
            .await
            .map_err(db_err)?;

        if inserted == 0 {
            return Err(StorageError::Duplicate {
                collection: collection.to_string(),
                id,
            }
            .into());
        }
        Ok(id)
    }

    /// Read-merge-write one document on the given client, under row lock.
    /// Returns whether the target existed.
    async fn merge_one<C: GenericClient>(
        client: &C,
        collection: &str,
        id: &str,
        partial: Map<String, Value>,
        now: &str,
        now_ts: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let row = client
            .query_opt(
                "SELECT data FROM collection_documents
                 WHERE collection = $1 AND id = $2 FOR UPDATE",
                &[&collection, &id],
            )
            .await
            .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(false);
        };

        let Json(data): Json<Value> = row.get("data");
        let mut existing = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        merge_update(&mut existing, partial, now);

        client
            .execute(
                "UPDATE collection_documents SET data = $3, updated_at = $4
                 WHERE collection = $1 AND id = $2",
                &[&collection, &id, &Json(Value::Object(existing)), &now_ts],
            )
            .await
            .map_err(db_err)?;
        Ok(true)
    }
}

#[async_trait]
impl DocumentBackend for PgBackend {
    async fn create(
        &self,
        collection: &str,
        data: Map<String, Value>,
        id: Option<String>,
    ) -> CoreResult<String> {
        let conn = self.conn().await?;
        let client: &tokio_postgres::Client = &conn;
        Self::insert_document(client, collection, data, id, &now_rfc3339(), Utc::now()).await
    }

    async fn read(&self, collection: &str, id: &str) -> CoreResult<Option<Document>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT id, data FROM collection_documents
                 WHERE collection = $1 AND id = $2",
                &[&collection, &id],
            )
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_document).transpose()
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        partial: Map<String, Value>,
    ) -> CoreResult<bool> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(db_err)?;
        let existed =
            Self::merge_one(&*tx, collection, id, partial, &now_rfc3339(), Utc::now()).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(existed)
    }

    async fn delete(&self, collection: &str, id: &str) -> CoreResult<bool> {
        let conn = self.conn().await?;
        let removed = conn
            .execute(
                "DELETE FROM collection_documents WHERE collection = $1 AND id = $2",
                &[&collection, &id],
            )
            .await
            .map_err(db_err)?;
        Ok(removed > 0)
    }

    async fn query(&self, collection: &str, spec: &QuerySpec) -> CoreResult<Vec<Document>> {
        let conn = self.conn().await?;

        let mut params: Vec<Box<dyn ToSql + Sync + Send>> =
            vec![Box::new(collection.to_string())];
        let (clauses, filter_params) = compile_filters(&spec.filters, 2);
        params.extend(filter_params);

        let mut sql = format!(
            "SELECT id, data FROM collection_documents WHERE collection = $1{}",
            where_sql(&clauses)
        );

        // Missing fields sort before everything ascending, after descending,
        // matching the in-memory backend.
        let direction = match spec.order {
            SortOrder::Asc => "ASC NULLS FIRST",
            SortOrder::Desc => "DESC NULLS LAST",
        };
        match &spec.order_by {
            Some(field) => {
                sql.push_str(&format!(
                    " ORDER BY data ->> ${} {}",
                    params.len() + 1,
                    direction
                ));
                params.push(Box::new(field.clone()));
            }
            None => {
                sql.push_str(&format!(" ORDER BY created_at {}", direction));
            }
        }

        if let Some(limit) = spec.limit {
            sql.push_str(&format!(" LIMIT ${}", params.len() + 1));
            params.push(Box::new(limit as i64));
        }
        if let Some(offset) = spec.offset {
            sql.push_str(&format!(" OFFSET ${}", params.len() + 1));
            params.push(Box::new(offset as i64));
        }

        let rows = conn.query(&sql, &as_refs(&params)).await.map_err(db_err)?;
        rows.iter().map(row_document).collect()
    }

    async fn count(&self, collection: &str, filters: &[Filter]) -> CoreResult<u64> {
        let conn = self.conn().await?;

        let mut params: Vec<Box<dyn ToSql + Sync + Send>> =
            vec![Box::new(collection.to_string())];
        let (clauses, filter_params) = compile_filters(filters, 2);
        params.extend(filter_params);

        let sql = format!(
            "SELECT COUNT(*) FROM collection_documents WHERE collection = $1{}",
            where_sql(&clauses)
        );
        let row = conn
            .query_one(&sql, &as_refs(&params))
            .await
            .map_err(db_err)?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }

    async fn search(
        &self,
        collection: &str,
        term: &str,
        fields: &[String],
        limit: u64,
    ) -> CoreResult<Vec<Document>> {
        if term.is_empty() || fields.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn().await?;

        let mut params: Vec<Box<dyn ToSql + Sync + Send>> = vec![
            Box::new(collection.to_string()),
            Box::new(format!("%{}%", term.to_lowercase())),
        ];
        let mut clauses = Vec::with_capacity(fields.len());
        for field in fields {
            clauses.push(format!("LOWER(data ->> ${}) LIKE $2", params.len() + 1));
            params.push(Box::new(field.clone()));
        }

        let sql = format!(
            "SELECT id, data FROM collection_documents
             WHERE collection = $1 AND ({})
             ORDER BY updated_at DESC LIMIT ${}",
            clauses.join(" OR "),
            params.len() + 1
        );
        params.push(Box::new(limit as i64));

        let rows = conn.query(&sql, &as_refs(&params)).await.map_err(db_err)?;
        rows.iter().map(row_document).collect()
    }

    async fn batch_create(
        &self,
        collection: &str,
        documents: Vec<Map<String, Value>>,
    ) -> CoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(db_err)?;

        let now = now_rfc3339();
        let now_ts = Utc::now();
        let mut ids = Vec::with_capacity(documents.len());
        for data in documents {
            ids.push(Self::insert_document(&*tx, collection, data, None, &now, now_ts).await?);
        }

        tx.commit().await.map_err(db_err)?;
        Ok(ids)
    }

    async fn batch_update(
        &self,
        collection: &str,
        updates: Vec<(String, Map<String, Value>)>,
    ) -> CoreResult<u64> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(db_err)?;

        let now = now_rfc3339();
        let now_ts = Utc::now();
        let mut updated = 0;
        for (id, partial) in updates {
            if Self::merge_one(&*tx, collection, &id, partial, &now, now_ts).await? {
                updated += 1;
            }
        }

        tx.commit().await.map_err(db_err)?;
        Ok(updated)
    }

    async fn health_check(&self) -> CoreResult<bool> {
        let conn = self.conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(db_err)?;
        Ok(true)
    }

    async fn stats(&self, collection: &str) -> CoreResult<CollectionStats> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT COUNT(*),
                    MIN(data ->> '{created}'),
                    MAX(data ->> '{created}')
             FROM collection_documents WHERE collection = $1",
            created = CREATED_AT
        );
        let row = conn.query_one(&sql, &[&collection]).await.map_err(db_err)?;

        let total: i64 = row.get(0);
        Ok(CollectionStats {
            collection: collection.to_string(),
            total_documents: total as u64,
            oldest_document: row.get(1),
            newest_document: row.get(2),
        })
    }
}
