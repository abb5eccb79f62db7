use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::filter::{Filter, FilterData, FilterError};
use crate::filter::filter_where::FilterWhere;

use super::datastore::Datastore;
use super::error::StoreError;

/// Postgres-backed datastore. Entity names map to table names; rows travel
/// as JSON documents via `row_to_json`, so the scoping interceptor and the
/// handlers stay schema-agnostic beyond the `tenant_id` column.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect() -> Result<Self, StoreError> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| StoreError::Database("DATABASE_URL is not set".to_string()))?;
        let cfg = &crate::config::CONFIG.database;
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(Duration::from_secs(cfg.connection_timeout))
            .connect(&url)
            .await?;
        Ok(Self { pool })
    }

    async fn fetch_json_rows(
        &self,
        query: &str,
        params: &[Value],
    ) -> Result<Vec<Value>, StoreError> {
        let wrapped = format!("SELECT row_to_json(t) AS row FROM ({}) t", query);
        let mut q = sqlx::query(&wrapped);
        for p in params {
            q = bind_param(q, p);
        }
        let rows = q.fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(row.try_get::<Value, _>("row")?);
        }
        Ok(out)
    }

    async fn fetch_json_row(
        &self,
        query: &str,
        params: &[Value],
    ) -> Result<Option<Value>, StoreError> {
        Ok(self.fetch_json_rows(query, params).await?.into_iter().next())
    }

    fn build_assignments(
        data: &Value,
        entity: &str,
        starting_param_index: usize,
    ) -> Result<(Vec<String>, Vec<Value>), StoreError> {
        let obj = data
            .as_object()
            .ok_or_else(|| StoreError::InvalidPayload {
                entity: entity.to_string(),
                message: "payload must be a JSON object".to_string(),
            })?;
        let mut assignments = Vec::with_capacity(obj.len());
        let mut params = Vec::with_capacity(obj.len());
        for (i, (column, value)) in obj.iter().enumerate() {
            validate_identifier(column)?;
            assignments.push(format!("\"{}\" = ${}", column, starting_param_index + i + 1));
            params.push(value.clone());
        }
        Ok((assignments, params))
    }

    fn build_insert(entity: &str, data: &Value) -> Result<(String, Vec<Value>), StoreError> {
        let obj = data
            .as_object()
            .ok_or_else(|| StoreError::InvalidPayload {
                entity: entity.to_string(),
                message: "payload must be a JSON object".to_string(),
            })?;
        if obj.is_empty() {
            return Err(StoreError::InvalidPayload {
                entity: entity.to_string(),
                message: "payload must not be empty".to_string(),
            });
        }
        validate_identifier(entity)?;
        let mut columns = Vec::with_capacity(obj.len());
        let mut placeholders = Vec::with_capacity(obj.len());
        let mut params = Vec::with_capacity(obj.len());
        for (i, (column, value)) in obj.iter().enumerate() {
            validate_identifier(column)?;
            columns.push(format!("\"{}\"", column));
            placeholders.push(format!("${}", i + 1));
            params.push(value.clone());
        }
        let query = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({}) RETURNING *",
            entity,
            columns.join(", "),
            placeholders.join(", ")
        );
        Ok((query, params))
    }
}

#[async_trait]
impl Datastore for PostgresStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_many(&self, entity: &str, filter: FilterData) -> Result<Vec<Value>, StoreError> {
        let mut f = Filter::new(entity)?;
        f.assign(filter)?;
        let sql = f.to_sql()?;
        self.fetch_json_rows(&sql.query, &sql.params).await
    }

    async fn find_first(
        &self,
        entity: &str,
        mut filter: FilterData,
    ) -> Result<Option<Value>, StoreError> {
        filter.limit = Some(1);
        Ok(self.find_many(entity, filter).await?.into_iter().next())
    }

    async fn find_unique(&self, entity: &str, where_: Value) -> Result<Option<Value>, StoreError> {
        let mut filter = FilterData::with_where(where_);
        filter.limit = Some(1);
        Ok(self.find_many(entity, filter).await?.into_iter().next())
    }

    async fn count(&self, entity: &str, where_: Option<Value>) -> Result<i64, StoreError> {
        let mut f = Filter::new(entity)?;
        if let Some(where_) = where_ {
            f.where_clause(where_)?;
        }
        let sql = f.to_count_sql()?;
        let mut q = sqlx::query(&sql.query);
        for p in &sql.params {
            q = bind_param(q, p);
        }
        let row = q.fetch_one(&self.pool).await?;
        let count: i64 = row.try_get("count")?;
        Ok(count)
    }

    async fn create(&self, entity: &str, data: Value) -> Result<Value, StoreError> {
        let (insert, params) = Self::build_insert(entity, &data)?;
        let query = format!("WITH w AS ({}) SELECT row_to_json(w) AS row FROM w", insert);
        self.fetch_json_row(&query, &params)
            .await?
            .ok_or_else(|| StoreError::Database(format!("insert into '{}' returned no row", entity)))
    }

    async fn create_many(&self, entity: &str, data: Vec<Value>) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut created = 0u64;
        for item in &data {
            let (insert, params) = Self::build_insert(entity, item)?;
            let mut q = sqlx::query(&insert);
            for p in &params {
                q = bind_param(q, p);
            }
            q.execute(&mut *tx).await?;
            created += 1;
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn update_unique(
        &self,
        entity: &str,
        where_: Value,
        data: Value,
    ) -> Result<Value, StoreError> {
        validate_identifier(entity)?;
        let (assignments, mut params) = Self::build_assignments(&data, entity, 0)?;
        if assignments.is_empty() {
            return Err(StoreError::InvalidPayload {
                entity: entity.to_string(),
                message: "update payload must not be empty".to_string(),
            });
        }
        let (where_sql, where_params) = FilterWhere::generate(&where_, params.len())?;
        params.extend(where_params);
        let query = format!(
            "WITH w AS (UPDATE \"{}\" SET {} WHERE {} RETURNING *) SELECT row_to_json(w) AS row FROM w",
            entity,
            assignments.join(", "),
            where_sql
        );
        self.fetch_json_row(&query, &params)
            .await?
            .ok_or_else(|| StoreError::Database(format!("no row matched update_unique on '{}'", entity)))
    }

    async fn update_many(
        &self,
        entity: &str,
        where_: Value,
        data: Value,
    ) -> Result<u64, StoreError> {
        validate_identifier(entity)?;
        let (assignments, mut params) = Self::build_assignments(&data, entity, 0)?;
        if assignments.is_empty() {
            return Err(StoreError::InvalidPayload {
                entity: entity.to_string(),
                message: "update payload must not be empty".to_string(),
            });
        }
        let (where_sql, where_params) = FilterWhere::generate(&where_, params.len())?;
        params.extend(where_params);
        let query = format!(
            "UPDATE \"{}\" SET {} WHERE {}",
            entity,
            assignments.join(", "),
            where_sql
        );
        let mut q = sqlx::query(&query);
        for p in &params {
            q = bind_param(q, p);
        }
        let result = q.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete_unique(&self, entity: &str, where_: Value) -> Result<Value, StoreError> {
        validate_identifier(entity)?;
        let (where_sql, params) = FilterWhere::generate(&where_, 0)?;
        let query = format!(
            "WITH w AS (DELETE FROM \"{}\" WHERE {} RETURNING *) SELECT row_to_json(w) AS row FROM w",
            entity, where_sql
        );
        self.fetch_json_row(&query, &params)
            .await?
            .ok_or_else(|| StoreError::Database(format!("no row matched delete_unique on '{}'", entity)))
    }

    async fn delete_many(&self, entity: &str, where_: Value) -> Result<u64, StoreError> {
        validate_identifier(entity)?;
        let (where_sql, params) = FilterWhere::generate(&where_, 0)?;
        let query = format!("DELETE FROM \"{}\" WHERE {}", entity, where_sql);
        let mut q = sqlx::query(&query);
        for p in &params {
            q = bind_param(q, p);
        }
        let result = q.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn upsert(
        &self,
        entity: &str,
        where_: Value,
        create: Value,
        update: Value,
    ) -> Result<Value, StoreError> {
        match self.find_unique(entity, where_.clone()).await? {
            Some(_) => self.update_unique(entity, where_, update).await,
            None => self.create(entity, create).await,
        }
    }
}

fn validate_identifier(name: &str) -> Result<(), FilterError> {
    let mut chars = name.chars();
    let valid_head = matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_');
    if !valid_head || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(FilterError::InvalidColumn(name.to_string()));
    }
    Ok(())
}

/// Bind a JSON parameter with the closest Postgres type. UUID-shaped
/// strings bind as UUID so predicates against uuid columns type-check.
fn bind_param<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    v: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(u) = n.as_u64() {
                q.bind(u as i64)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => {
            if let Ok(uuid) = Uuid::parse_str(s) {
                q.bind(uuid)
            } else {
                q.bind(s)
            }
        }
        Value::Array(_) | Value::Object(_) => q.bind(v), // JSONB
    }
}
