use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::filter::{eval, FilterData};

use super::datastore::Datastore;
use super::error::StoreError;

/// In-memory datastore evaluating the same filter grammar as the Postgres
/// path. Backs the test suite and local development without a database.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matching_rows(&self, entity: &str, where_: &Value) -> Result<Vec<Value>, StoreError> {
        let tables = self.tables.read().expect("memory store lock poisoned");
        let mut out = Vec::new();
        if let Some(rows) = tables.get(entity) {
            for row in rows {
                if eval::matches_where(row, where_)? {
                    out.push(row.clone());
                }
            }
        }
        Ok(out)
    }

    fn ensure_id(mut data: Value) -> Value {
        if let Some(obj) = data.as_object_mut() {
            obj.entry("id".to_string())
                .or_insert_with(|| json!(Uuid::new_v4()));
        }
        data
    }

    fn apply_patch(row: &mut Value, patch: &Value) {
        if let (Some(obj), Some(patch)) = (row.as_object_mut(), patch.as_object()) {
            for (k, v) in patch {
                obj.insert(k.clone(), v.clone());
            }
        }
    }
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn find_many(&self, entity: &str, filter: FilterData) -> Result<Vec<Value>, StoreError> {
        let where_ = filter.where_clause.unwrap_or(Value::Null);
        let mut rows = self.matching_rows(entity, &where_)?;
        if let Some(order) = &filter.order {
            eval::sort_rows(&mut rows, order)?;
        }
        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        // Same page-size cap the SQL path applies in Filter::limit.
        let max_limit = crate::config::CONFIG.filter.max_limit.unwrap_or(i32::MAX);
        let rows: Vec<Value> = match filter.limit {
            Some(limit) => rows
                .into_iter()
                .skip(offset)
                .take(limit.min(max_limit).max(0) as usize)
                .collect(),
            None => rows.into_iter().skip(offset).collect(),
        };
        Ok(rows)
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
        Ok(self.matching_rows(entity, &where_)?.into_iter().next())
    }

    async fn count(&self, entity: &str, where_: Option<Value>) -> Result<i64, StoreError> {
        let where_ = where_.unwrap_or(Value::Null);
        Ok(self.matching_rows(entity, &where_)?.len() as i64)
    }

    async fn create(&self, entity: &str, data: Value) -> Result<Value, StoreError> {
        let row = Self::ensure_id(data);
        let mut tables = self.tables.write().expect("memory store lock poisoned");
        tables
            .entry(entity.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn create_many(&self, entity: &str, data: Vec<Value>) -> Result<u64, StoreError> {
        let count = data.len() as u64;
        let mut tables = self.tables.write().expect("memory store lock poisoned");
        let table = tables.entry(entity.to_string()).or_default();
        for item in data {
            table.push(Self::ensure_id(item));
        }
        Ok(count)
    }

    async fn update_unique(
        &self,
        entity: &str,
        where_: Value,
        data: Value,
    ) -> Result<Value, StoreError> {
        let mut tables = self.tables.write().expect("memory store lock poisoned");
        let table = tables.entry(entity.to_string()).or_default();
        for row in table.iter_mut() {
            if eval::matches_where(row, &where_)? {
                Self::apply_patch(row, &data);
                return Ok(row.clone());
            }
        }
        Err(StoreError::Database(format!(
            "no row matched update_unique on '{}'",
            entity
        )))
    }

    async fn update_many(
        &self,
        entity: &str,
        where_: Value,
        data: Value,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().expect("memory store lock poisoned");
        let table = tables.entry(entity.to_string()).or_default();
        let mut updated = 0u64;
        for row in table.iter_mut() {
            if eval::matches_where(row, &where_)? {
                Self::apply_patch(row, &data);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_unique(&self, entity: &str, where_: Value) -> Result<Value, StoreError> {
        let mut tables = self.tables.write().expect("memory store lock poisoned");
        let table = tables.entry(entity.to_string()).or_default();
        for (i, row) in table.iter().enumerate() {
            if eval::matches_where(row, &where_)? {
                return Ok(table.remove(i));
            }
        }
        Err(StoreError::Database(format!(
            "no row matched delete_unique on '{}'",
            entity
        )))
    }

    async fn delete_many(&self, entity: &str, where_: Value) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().expect("memory store lock poisoned");
        let table = tables.entry(entity.to_string()).or_default();
        let before = table.len();
        let mut err = None;
        table.retain(|row| match eval::matches_where(row, &where_) {
            Ok(matched) => !matched,
            Err(e) => {
                err.get_or_insert(e);
                true
            }
        });
        if let Some(e) = err {
            return Err(e.into());
        }
        Ok((before - table.len()) as u64)
    }

    async fn upsert(
        &self,
        entity: &str,
        where_: Value,
        create: Value,
        update: Value,
    ) -> Result<Value, StoreError> {
        let existing = self.find_unique(entity, where_.clone()).await?;
        match existing {
            Some(_) => self.update_unique(entity, where_, update).await,
            None => self.create(entity, create).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_assigns_id_and_find_filters() {
        let store = MemoryStore::new();
        let created = store
            .create("tickets", json!({"title": "leak", "status": "open"}))
            .await
            .unwrap();
        assert!(created["id"].is_string());

        store
            .create("tickets", json!({"title": "outage", "status": "closed"}))
            .await
            .unwrap();

        let open = store
            .find_many("tickets", FilterData::with_where(json!({"status": "open"})))
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0]["title"], json!("leak"));
    }

    #[tokio::test]
    async fn limit_is_clamped_to_the_configured_cap() {
        let store = MemoryStore::new();
        let cap = crate::config::CONFIG.filter.max_limit.unwrap() as usize;
        for i in 0..cap + 10 {
            store.create("tickets", json!({"n": i})).await.unwrap();
        }
        let rows = store
            .find_many(
                "tickets",
                FilterData {
                    limit: Some(i32::MAX),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), cap);
    }

    #[tokio::test]
    async fn update_many_counts_affected_rows() {
        let store = MemoryStore::new();
        for i in 0..3 {
            store
                .create("tickets", json!({"n": i, "status": "open"}))
                .await
                .unwrap();
        }
        let updated = store
            .update_many(
                "tickets",
                json!({"n": {"$lt": 2}}),
                json!({"status": "closed"}),
            )
            .await
            .unwrap();
        assert_eq!(updated, 2);
        assert_eq!(
            store
                .count("tickets", Some(json!({"status": "closed"})))
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn upsert_creates_then_updates() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store
            .upsert(
                "zones",
                json!({"id": id}),
                json!({"id": id, "name": "north"}),
                json!({"name": "renamed"}),
            )
            .await
            .unwrap();
        let row = store
            .upsert(
                "zones",
                json!({"id": id}),
                json!({"id": id, "name": "north"}),
                json!({"name": "renamed"}),
            )
            .await
            .unwrap();
        assert_eq!(row["name"], json!("renamed"));
        assert_eq!(store.count("zones", None).await.unwrap(), 1);
    }
}
