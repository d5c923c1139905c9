use crate::error::StoreError;
use crate::models::{
    ComponentRecord, ComponentUpdate, EnrichedRow, ListFilter, NewComponent, RecordRole,
    StoreStats,
};
use crate::traits::{ComponentReader, GraphSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS components (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    unique_id TEXT NOT NULL UNIQUE,
    material_id TEXT NOT NULL,
    component_id TEXT NOT NULL,
    description TEXT NOT NULL,
    qty REAL NOT NULL DEFAULT 1.0,
    path TEXT NOT NULL,
    parent_id INTEGER,
    abs_level INTEGER NOT NULL DEFAULT 0,
    record_type TEXT NOT NULL DEFAULT 'LEAF',
    is_assembly INTEGER NOT NULL DEFAULT 0,
    is_subassembly INTEGER NOT NULL DEFAULT 0,
    is_leaf INTEGER NOT NULL DEFAULT 0,
    usage_count INTEGER NOT NULL DEFAULT 0,
    clean_name TEXT NOT NULL DEFAULT '',
    vendor TEXT NOT NULL DEFAULT '',
    material TEXT NOT NULL DEFAULT '',
    size TEXT NOT NULL DEFAULT '',
    component_type TEXT NOT NULL DEFAULT '',
    standard TEXT NOT NULL DEFAULT '',
    embedding_vector TEXT,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_components_unique_id ON components(unique_id);
CREATE INDEX IF NOT EXISTS idx_components_material_id ON components(material_id);
CREATE INDEX IF NOT EXISTS idx_components_component_id ON components(component_id);
CREATE INDEX IF NOT EXISTS idx_components_path ON components(path);
CREATE INDEX IF NOT EXISTS idx_components_record_type ON components(record_type);
"#;

const SELECT_COLUMNS: &str = "id, unique_id, material_id, component_id, description, qty, path, \
     parent_id, abs_level, record_type, is_assembly, is_subassembly, is_leaf, usage_count, \
     clean_name, vendor, material, size, component_type, standard, embedding_vector, updated_at";

const TEXT_SEARCH_COLUMNS: [&str; 8] = [
    "clean_name",
    "description",
    "component_id",
    "vendor",
    "material",
    "size",
    "component_type",
    "standard",
];

/// Relational component store over sqlite.
pub struct SqliteComponentStore {
    pool: SqlitePool,
}

impl SqliteComponentStore {
    pub async fn connect(database_path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = std::path::Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|error| StoreError::InvalidArgument(error.to_string()))?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{database_path}"))
            .map_err(StoreError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Single-connection in-memory store, used by tests.
    pub async fn connect_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(StoreError::Database)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn record_from_row(row: &SqliteRow) -> Result<ComponentRecord, StoreError> {
        let embedding_raw: Option<String> = row.try_get("embedding_vector")?;
        let embedding_vector = match embedding_raw {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        };

        let record_type: String = row.try_get("record_type")?;
        let updated_raw: String = row.try_get("updated_at")?;
        let updated_at = DateTime::parse_from_rfc3339(&updated_raw)
            .map(|stamp| stamp.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(ComponentRecord {
            id: row.try_get("id")?,
            unique_id: row.try_get("unique_id")?,
            material_id: row.try_get("material_id")?,
            component_id: row.try_get("component_id")?,
            description: row.try_get("description")?,
            qty: row.try_get("qty")?,
            path: row.try_get("path")?,
            parent_id: row.try_get("parent_id")?,
            abs_level: row.try_get("abs_level")?,
            record_type: RecordRole::parse(&record_type),
            is_assembly: row.try_get("is_assembly")?,
            is_subassembly: row.try_get("is_subassembly")?,
            is_leaf: row.try_get("is_leaf")?,
            usage_count: row.try_get("usage_count")?,
            clean_name: row.try_get("clean_name")?,
            vendor: row.try_get("vendor")?,
            material: row.try_get("material")?,
            size: row.try_get("size")?,
            component_type: row.try_get("component_type")?,
            standard: row.try_get("standard")?,
            embedding_vector,
            updated_at,
        })
    }

    pub async fn create(&self, data: NewComponent) -> Result<ComponentRecord, StoreError> {
        let unique_id = data.unique_id.clone().unwrap_or_else(|| {
            format!("{}:{}:{}", data.material_id, data.component_id, data.path)
        });
        let record_type = data.record_type.unwrap_or(RecordRole::Leaf);
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO components (unique_id, material_id, component_id, description, qty, \
             path, parent_id, abs_level, record_type, is_assembly, is_subassembly, is_leaf, \
             usage_count, clean_name, vendor, material, size, component_type, standard, \
             updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&unique_id)
        .bind(&data.material_id)
        .bind(&data.component_id)
        .bind(&data.description)
        .bind(data.qty)
        .bind(&data.path)
        .bind(data.parent_id)
        .bind(data.abs_level.unwrap_or(0))
        .bind(record_type.as_str())
        .bind(data.is_assembly.unwrap_or(false))
        .bind(data.is_subassembly.unwrap_or(false))
        .bind(data.is_leaf.unwrap_or(false))
        .bind(data.usage_count.unwrap_or(0))
        .bind(data.clean_name.unwrap_or_default())
        .bind(data.vendor.unwrap_or_default())
        .bind(data.material.unwrap_or_default())
        .bind(data.size.unwrap_or_default())
        .bind(data.component_type.unwrap_or_default())
        .bind(data.standard.unwrap_or_default())
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("component {id} after insert")))
    }

    pub async fn get(&self, id: i64) -> Result<Option<ComponentRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM components WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    pub async fn get_by_unique_id(
        &self,
        unique_id: &str,
    ) -> Result<Option<ComponentRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM components WHERE unique_id = ?"
        ))
        .bind(unique_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    pub async fn update(
        &self,
        id: i64,
        updates: &ComponentUpdate,
    ) -> Result<Option<ComponentRecord>, StoreError> {
        if self.get(id).await?.is_none() {
            return Ok(None);
        }
        if updates.is_empty() {
            return self.get(id).await;
        }

        let mut assignments = Vec::new();
        let mut values: Vec<String> = Vec::new();

        let push = |column: &str, value: &Option<String>, assignments: &mut Vec<String>, values: &mut Vec<String>| {
            if let Some(value) = value {
                assignments.push(format!("{column} = ?"));
                values.push(value.clone());
            }
        };

        push("description", &updates.description, &mut assignments, &mut values);
        push("clean_name", &updates.clean_name, &mut assignments, &mut values);
        push("vendor", &updates.vendor, &mut assignments, &mut values);
        push("material", &updates.material, &mut assignments, &mut values);
        push("size", &updates.size, &mut assignments, &mut values);
        push("component_type", &updates.component_type, &mut assignments, &mut values);
        push("standard", &updates.standard, &mut assignments, &mut values);

        if updates.qty.is_some() {
            assignments.push("qty = ?".to_string());
        }
        assignments.push("updated_at = ?".to_string());

        let sql = format!(
            "UPDATE components SET {} WHERE id = ?",
            assignments.join(", ")
        );
        let mut query = sqlx::query(&sql);
        for value in &values {
            query = query.bind(value);
        }
        if let Some(qty) = updates.qty {
            query = query.bind(qty);
        }
        query = query.bind(Utc::now().to_rfc3339()).bind(id);
        query.execute(&self.pool).await?;

        self.get(id).await
    }

    pub async fn set_embedding(
        &self,
        id: i64,
        embedding: &[f32],
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(embedding)?;
        sqlx::query("UPDATE components SET embedding_vector = ?, updated_at = ? WHERE id = ?")
            .bind(encoded)
            .bind(updated_at.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Every record whose path is a strict descendant of the given path.
    pub async fn descendants(&self, path: &str) -> Result<Vec<ComponentRecord>, StoreError> {
        let pattern = format!("{path}.%");
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM components WHERE path LIKE ?"
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::record_from_row).collect()
    }

    pub async fn delete_rows(&self, ids: &[i64]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM components WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Full-table replace: clears the store and inserts the processed batch
    /// with its surrogate ids, so numeric paths stay resolvable.
    pub async fn bulk_replace(&self, rows: &[EnrichedRow]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM components").execute(&mut *tx).await?;

        let now = Utc::now().to_rfc3339();
        for row in rows {
            sqlx::query(
                "INSERT INTO components (id, unique_id, material_id, component_id, description, \
                 qty, path, parent_id, abs_level, record_type, is_assembly, is_subassembly, \
                 is_leaf, usage_count, clean_name, vendor, material, size, component_type, \
                 standard, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(row.row_id)
            .bind(&row.unique_id)
            .bind(&row.material_id)
            .bind(&row.component_id)
            .bind(&row.description)
            .bind(row.qty)
            .bind(&row.path)
            .bind(row.parent_id)
            .bind(row.abs_level)
            .bind(row.record_type.as_str())
            .bind(row.is_assembly)
            .bind(row.is_subassembly)
            .bind(row.is_leaf)
            .bind(row.usage_count)
            .bind(&row.clean_name)
            .bind(&row.vendor)
            .bind(&row.material)
            .bind(&row.size)
            .bind(&row.component_type)
            .bind(&row.standard)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(rows.len())
    }

    pub async fn list(
        &self,
        filter: &ListFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ComponentRecord>, StoreError> {
        let mut conditions: Vec<String> = Vec::new();
        let mut text_binds: Vec<String> = Vec::new();
        let mut int_binds: Vec<i64> = Vec::new();

        if let Some(material_id) = &filter.material_id {
            conditions.push("material_id = ?".to_string());
            text_binds.push(material_id.clone());
        }
        if let Some(component_id) = &filter.component_id {
            conditions.push("component_id = ?".to_string());
            text_binds.push(component_id.clone());
        }
        if let Some(record_type) = filter.record_type {
            conditions.push("record_type = ?".to_string());
            text_binds.push(record_type.as_str().to_string());
        }
        if let Some(abs_level) = filter.abs_level {
            conditions.push("abs_level = ?".to_string());
            int_binds.push(abs_level);
        }
        if let Some(is_assembly) = filter.is_assembly {
            conditions.push("is_assembly = ?".to_string());
            int_binds.push(is_assembly as i64);
        }
        if let Some(is_subassembly) = filter.is_subassembly {
            conditions.push("is_subassembly = ?".to_string());
            int_binds.push(is_subassembly as i64);
        }
        if let Some(is_leaf) = filter.is_leaf {
            conditions.push("is_leaf = ?".to_string());
            int_binds.push(is_leaf as i64);
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM components{where_clause} ORDER BY id LIMIT ? OFFSET ?"
        );

        let mut query = sqlx::query(&sql);
        for value in &text_binds {
            query = query.bind(value.clone());
        }
        for value in &int_binds {
            query = query.bind(*value);
        }
        query = query.bind(limit).bind(offset);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::record_from_row).collect()
    }

    /// Substring search over one column, or identifier plus clean name by
    /// default, optionally restricted to one structural role.
    pub async fn search_text(
        &self,
        needle: &str,
        column: Option<&str>,
        record_type: Option<RecordRole>,
        limit: i64,
    ) -> Result<Vec<ComponentRecord>, StoreError> {
        let pattern = format!("%{needle}%");

        let mut conditions;
        match column {
            Some(column) => {
                if !TEXT_SEARCH_COLUMNS.contains(&column) {
                    return Err(StoreError::InvalidArgument(format!(
                        "unsearchable column: {column}"
                    )));
                }
                conditions = vec![format!("{column} LIKE ?")];
            }
            None => {
                conditions = vec!["(component_id LIKE ? OR clean_name LIKE ?)".to_string()];
            }
        }
        if record_type.is_some() {
            conditions.push("record_type = ?".to_string());
        }

        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM components WHERE {} ORDER BY id LIMIT ?",
            conditions.join(" AND ")
        );

        let mut query = sqlx::query(&sql).bind(&pattern);
        if column.is_none() {
            query = query.bind(&pattern);
        }
        if let Some(record_type) = record_type {
            query = query.bind(record_type.as_str());
        }
        query = query.bind(limit);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::record_from_row).collect()
    }

    /// Page of rows strictly after the given id, in id order; drives the
    /// embedding rebuild sweep.
    pub async fn page_after(
        &self,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<ComponentRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM components WHERE id > ? ORDER BY id LIMIT ?"
        ))
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::record_from_row).collect()
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(id) FROM components")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let total = self.count().await?;

        let count_role = |role: &'static str| async move {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(id) FROM components WHERE record_type = ?",
            )
            .bind(role)
            .fetch_one(&self.pool)
            .await
        };

        let assemblies = count_role("ASSEMBLY").await?;
        let subassemblies = count_role("SUBASSEMBLY").await?;
        let leafs = count_role("LEAF").await?;

        let max_depth: Option<i64> = sqlx::query_scalar("SELECT MAX(abs_level) FROM components")
            .fetch_one(&self.pool)
            .await?;

        let distinct = |column: &'static str| async move {
            sqlx::query_scalar::<_, i64>(&format!(
                "SELECT COUNT(DISTINCT {column}) FROM components WHERE {column} != ''"
            ))
            .fetch_one(&self.pool)
            .await
        };

        Ok(StoreStats {
            total,
            assemblies,
            subassemblies,
            leafs,
            max_depth: max_depth.unwrap_or(0),
            unique_materials: distinct("material").await?,
            unique_vendors: distinct("vendor").await?,
            unique_types: distinct("component_type").await?,
        })
    }

    /// Cheap freshness fingerprint: row count plus the latest update stamp.
    pub async fn fingerprint(&self) -> Result<String, StoreError> {
        let count = self.count().await?;
        let latest: Option<String> = sqlx::query_scalar("SELECT MAX(updated_at) FROM components")
            .fetch_one(&self.pool)
            .await?;
        Ok(format!("{}-{}", count, latest.unwrap_or_default()))
    }
}

#[async_trait]
impl ComponentReader for SqliteComponentStore {
    async fn component_by_unique_id(
        &self,
        unique_id: &str,
    ) -> Result<Option<ComponentRecord>, StoreError> {
        self.get_by_unique_id(unique_id).await
    }

    async fn components_by_unique_ids(
        &self,
        unique_ids: &[String],
    ) -> Result<Vec<ComponentRecord>, StoreError> {
        if unique_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; unique_ids.len()].join(", ");
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM components WHERE unique_id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql);
        for unique_id in unique_ids {
            query = query.bind(unique_id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::record_from_row).collect()
    }
}

#[async_trait]
impl GraphSource for SqliteComponentStore {
    async fn store_fingerprint(&self) -> Result<String, StoreError> {
        self.fingerprint().await
    }

    async fn material_components(
        &self,
        material_id: &str,
    ) -> Result<Vec<ComponentRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM components WHERE material_id = ? ORDER BY id"
        ))
        .bind(material_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::record_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_component(unique_id: &str, component_id: &str, path: &str) -> NewComponent {
        NewComponent {
            unique_id: Some(unique_id.to_string()),
            material_id: "M1".to_string(),
            component_id: component_id.to_string(),
            description: format!("{component_id} description"),
            qty: 1.0,
            path: path.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_and_fetch_round_trip() {
        let store = SqliteComponentStore::connect_in_memory().await.unwrap();
        let created = store.create(new_component("u-1", "A", "1")).await.unwrap();

        let fetched = store.get(created.id).await.unwrap().expect("row");
        assert_eq!(fetched.unique_id, "u-1");
        assert_eq!(fetched.component_id, "A");

        let by_uid = store.get_by_unique_id("u-1").await.unwrap().expect("row");
        assert_eq!(by_uid.id, created.id);
    }

    #[tokio::test]
    async fn missing_unique_id_falls_back_to_composite_format() {
        let store = SqliteComponentStore::connect_in_memory().await.unwrap();
        let created = store
            .create(NewComponent {
                material_id: "M1".to_string(),
                component_id: "A".to_string(),
                description: "Pump".to_string(),
                qty: 1.0,
                path: "A".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(created.unique_id, "M1:A:A");
    }

    #[tokio::test]
    async fn duplicate_unique_id_is_a_constraint_violation() {
        let store = SqliteComponentStore::connect_in_memory().await.unwrap();
        store.create(new_component("u-1", "A", "1")).await.unwrap();

        let result = store.create(new_component("u-1", "B", "2")).await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }

    #[tokio::test]
    async fn update_is_partial_and_bumps_the_timestamp() {
        let store = SqliteComponentStore::connect_in_memory().await.unwrap();
        let created = store.create(new_component("u-1", "A", "1")).await.unwrap();

        let updated = store
            .update(
                created.id,
                &ComponentUpdate {
                    clean_name: Some("PUMP HOUSING".to_string()),
                    qty: Some(4.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .expect("row");

        assert_eq!(updated.clean_name, "PUMP HOUSING");
        assert!((updated.qty - 4.0).abs() < f64::EPSILON);
        assert_eq!(updated.component_id, "A");
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn update_of_missing_row_returns_none() {
        let store = SqliteComponentStore::connect_in_memory().await.unwrap();
        let result = store.update(42, &ComponentUpdate::default()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn descendants_match_strict_path_prefix_only() {
        let store = SqliteComponentStore::connect_in_memory().await.unwrap();
        store.create(new_component("u-1", "A", "1")).await.unwrap();
        store.create(new_component("u-2", "B", "1.2")).await.unwrap();
        store.create(new_component("u-3", "C", "1.2.3")).await.unwrap();
        store.create(new_component("u-4", "D", "10")).await.unwrap();

        let descendants = store.descendants("1").await.unwrap();
        let ids: Vec<String> = descendants
            .into_iter()
            .map(|record| record.unique_id)
            .collect();
        assert_eq!(ids, vec!["u-2".to_string(), "u-3".to_string()]);
    }

    #[tokio::test]
    async fn bulk_replace_clears_previous_contents() {
        let store = SqliteComponentStore::connect_in_memory().await.unwrap();
        store.create(new_component("old", "X", "9")).await.unwrap();

        let rows = vec![enriched("u-1", "A", "1", 1), enriched("u-2", "B", "1.2", 2)];
        let imported = store.bulk_replace(&rows).await.unwrap();

        assert_eq!(imported, 2);
        assert_eq!(store.count().await.unwrap(), 2);
        assert!(store.get_by_unique_id("old").await.unwrap().is_none());

        let record = store.get_by_unique_id("u-2").await.unwrap().expect("row");
        assert_eq!(record.id, 2);
    }

    #[tokio::test]
    async fn list_applies_equality_filters() {
        let store = SqliteComponentStore::connect_in_memory().await.unwrap();
        let rows = vec![enriched("u-1", "A", "1", 1), enriched("u-2", "B", "1.2", 2)];
        store.bulk_replace(&rows).await.unwrap();

        let filter = ListFilter {
            component_id: Some("B".to_string()),
            ..Default::default()
        };
        let listed = store.list(&filter, 10, 0).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].unique_id, "u-2");

        let all = store.list(&ListFilter::default(), 1, 1).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].unique_id, "u-2");
    }

    #[tokio::test]
    async fn text_search_defaults_to_identifier_and_clean_name() {
        let store = SqliteComponentStore::connect_in_memory().await.unwrap();
        let mut rows = vec![enriched("u-1", "A", "1", 1), enriched("u-2", "B", "1.2", 2)];
        rows[0].clean_name = "Pump housing".to_string();
        rows[1].clean_name = "Shaft".to_string();
        store.bulk_replace(&rows).await.unwrap();

        let hits = store.search_text("hous", None, None, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].unique_id, "u-1");

        let unknown_column = store.search_text("x", Some("qty"), None, 10).await;
        assert!(matches!(unknown_column, Err(StoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn stats_aggregate_roles_and_depth() {
        let store = SqliteComponentStore::connect_in_memory().await.unwrap();
        let mut rows = vec![
            enriched("u-1", "A", "1", 1),
            enriched("u-2", "B", "1.2", 2),
            enriched("u-3", "C", "1.2.3", 3),
        ];
        rows[0].record_type = RecordRole::Assembly;
        rows[0].abs_level = 0;
        rows[1].record_type = RecordRole::Subassembly;
        rows[1].abs_level = 1;
        rows[2].record_type = RecordRole::Leaf;
        rows[2].abs_level = 2;
        rows[2].vendor = "ACME".to_string();
        store.bulk_replace(&rows).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.assemblies, 1);
        assert_eq!(stats.subassemblies, 1);
        assert_eq!(stats.leafs, 1);
        assert_eq!(stats.max_depth, 2);
        assert_eq!(stats.unique_vendors, 1);
    }

    #[tokio::test]
    async fn fingerprint_changes_on_write() {
        let store = SqliteComponentStore::connect_in_memory().await.unwrap();
        let before = store.fingerprint().await.unwrap();

        store.create(new_component("u-1", "A", "1")).await.unwrap();
        let after = store.fingerprint().await.unwrap();

        assert_ne!(before, after);
    }

    fn enriched(unique_id: &str, component_id: &str, path: &str, row_id: i64) -> EnrichedRow {
        EnrichedRow {
            row_id,
            unique_id: unique_id.to_string(),
            material_id: "M1".to_string(),
            component_id: component_id.to_string(),
            description: format!("{component_id} description"),
            qty: 1.0,
            path: path.to_string(),
            parent_id: None,
            abs_level: path.matches('.').count() as i64,
            record_type: crate::models::RecordRole::Leaf,
            is_assembly: false,
            is_subassembly: false,
            is_leaf: true,
            usage_count: 1,
            usage_norm: 1.0,
            usage_category: crate::models::UsageCategory::Unique,
            clean_name: format!("{component_id} clean"),
            component_type: String::new(),
            material: String::new(),
            size: String::new(),
            vendor: String::new(),
            standard: String::new(),
            confidence_scores: Default::default(),
            embedding_text: String::new(),
            search_text: String::new(),
            qty_log: 0.0,
        }
    }
}
