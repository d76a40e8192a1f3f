use std::collections::HashMap;

use partscout_core::error::AppError;
use partscout_core::models::{ApplianceType, Model, Part, PartitionCounts, ReplaceSummary};
use partscout_core::snapshot::CatalogSnapshot;
use sqlx::{PgPool, Pool, Postgres};

/// Repository for catalog persistence in PostgreSQL.
#[derive(Clone)]
pub struct CatalogRepository {
    pool: Pool<Postgres>,
    min_model_ratio: Option<f64>,
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            min_model_ratio: None,
        }
    }

    /// Refuse replaces that would leave fewer than `ratio` × the stored
    /// model count for the partition. Off by default.
    pub fn with_min_model_ratio(mut self, ratio: f64) -> Self {
        self.min_model_ratio = Some(ratio);
        self
    }

    /// Replace every row of the snapshot's appliance partition, in one
    /// transaction. On any error the transaction is rolled back and the
    /// previous partition contents remain.
    pub async fn replace_partition(
        &self,
        snapshot: &CatalogSnapshot,
    ) -> Result<ReplaceSummary, AppError> {
        let appliance = snapshot.appliance_type.as_str();
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if let Some(ratio) = self.min_model_ratio {
            let existing: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM models WHERE appliance_type = $1")
                    .bind(appliance)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(db_err)?;
            check_shrink(existing, snapshot.models.len(), ratio)?;
        }

        let mut summary = ReplaceSummary::default();

        // Links go first: they reference both tables.
        summary.links_deleted = sqlx::query(
            r#"
            DELETE FROM model_parts
            WHERE model_number IN (SELECT model_number FROM models WHERE appliance_type = $1)
               OR part_number IN (SELECT part_number FROM parts WHERE appliance_type = $1)
            "#,
        )
        .bind(appliance)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected();

        summary.parts_deleted = sqlx::query("DELETE FROM parts WHERE appliance_type = $1")
            .bind(appliance)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();

        summary.models_deleted = sqlx::query("DELETE FROM models WHERE appliance_type = $1")
            .bind(appliance)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();

        for model in &snapshot.models {
            sqlx::query(
                r#"
                INSERT INTO models (model_number, name, brand, appliance_type, source_url)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (model_number) DO UPDATE SET
                    name = EXCLUDED.name,
                    brand = EXCLUDED.brand,
                    appliance_type = EXCLUDED.appliance_type,
                    source_url = EXCLUDED.source_url,
                    updated_at = NOW()
                "#,
            )
            .bind(&model.model_number)
            .bind(&model.name)
            .bind(&model.brand)
            .bind(model.appliance_type.as_str())
            .bind(&model.source_url)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            summary.models_written += 1;
        }

        for part in dedupe_parts(&snapshot.parts) {
            sqlx::query(
                r#"
                INSERT INTO parts (part_number, manufacturer_part_number, name, description,
                                   price, manufacturer, appliance_type, source_url)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (part_number) DO UPDATE SET
                    manufacturer_part_number = EXCLUDED.manufacturer_part_number,
                    name = EXCLUDED.name,
                    description = EXCLUDED.description,
                    price = EXCLUDED.price,
                    manufacturer = EXCLUDED.manufacturer,
                    appliance_type = EXCLUDED.appliance_type,
                    source_url = EXCLUDED.source_url,
                    updated_at = NOW()
                "#,
            )
            .bind(&part.part_number)
            .bind(&part.manufacturer_part_number)
            .bind(&part.name)
            .bind(&part.description)
            .bind(part.price)
            .bind(&part.manufacturer)
            .bind(part.appliance_type.as_str())
            .bind(&part.source_url)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            summary.parts_written += 1;
        }

        for link in &snapshot.links {
            summary.links_written += sqlx::query(
                r#"
                INSERT INTO model_parts (model_number, part_number)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(&link.model_number)
            .bind(&link.part_number)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();
        }

        tx.commit().await.map_err(db_err)?;

        tracing::debug!(
            appliance_type = %snapshot.appliance_type,
            models_deleted = summary.models_deleted,
            models_written = summary.models_written,
            parts_written = summary.parts_written,
            links_written = summary.links_written,
            "Partition replace committed"
        );
        Ok(summary)
    }

    /// Row counts for one partition.
    pub async fn partition_counts(
        &self,
        appliance: ApplianceType,
    ) -> Result<PartitionCounts, AppError> {
        let (models, parts, links): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM models WHERE appliance_type = $1),
                (SELECT COUNT(*) FROM parts WHERE appliance_type = $1),
                (SELECT COUNT(*) FROM model_parts mp
                    JOIN models m ON m.model_number = mp.model_number
                    WHERE m.appliance_type = $1)
            "#,
        )
        .bind(appliance.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(PartitionCounts {
            models,
            parts,
            links,
        })
    }

    pub async fn get_model(&self, model_number: &str) -> Result<Option<Model>, AppError> {
        let row = sqlx::query_as::<_, ModelRow>(
            r#"
            SELECT model_number, name, brand, appliance_type, source_url
            FROM models
            WHERE model_number = $1
            "#,
        )
        .bind(model_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Model::try_from).transpose()
    }

    pub async fn get_part(&self, part_number: &str) -> Result<Option<Part>, AppError> {
        let row = sqlx::query_as::<_, PartRow>(
            r#"
            SELECT part_number, manufacturer_part_number, name, description, price,
                   manufacturer, appliance_type, source_url
            FROM parts
            WHERE part_number = $1
            "#,
        )
        .bind(part_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Part::try_from).transpose()
    }

    /// Parts linked to a model, ordered by part number.
    pub async fn parts_for_model(&self, model_number: &str) -> Result<Vec<Part>, AppError> {
        let rows = sqlx::query_as::<_, PartRow>(
            r#"
            SELECT p.part_number, p.manufacturer_part_number, p.name, p.description, p.price,
                   p.manufacturer, p.appliance_type, p.source_url
            FROM parts p
            JOIN model_parts mp ON mp.part_number = p.part_number
            WHERE mp.model_number = $1
            ORDER BY p.part_number
            "#,
        )
        .bind(model_number)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(Part::try_from).collect()
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn check_shrink(existing: i64, incoming: usize, ratio: f64) -> Result<(), AppError> {
    if existing > 0 && (incoming as f64) < ratio * existing as f64 {
        tracing::warn!(existing, incoming, ratio, "Shrink guard refused partition replace");
        return Err(AppError::ShrinkGuard { existing, incoming });
    }
    Ok(())
}

/// One row per part number; the last occurrence wins, first-seen order kept.
fn dedupe_parts(parts: &[Part]) -> Vec<&Part> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut unique: Vec<&Part> = Vec::with_capacity(parts.len());
    for part in parts {
        match index.get(part.part_number.as_str()) {
            Some(&i) => unique[i] = part,
            None => {
                index.insert(&part.part_number, unique.len());
                unique.push(part);
            }
        }
    }
    unique
}

// -- Internal row types for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct ModelRow {
    model_number: String,
    name: String,
    brand: Option<String>,
    appliance_type: String,
    source_url: String,
}

impl TryFrom<ModelRow> for Model {
    type Error = AppError;

    fn try_from(row: ModelRow) -> Result<Self, Self::Error> {
        Ok(Model {
            appliance_type: row.appliance_type.parse().map_err(AppError::DatabaseError)?,
            model_number: row.model_number,
            name: row.name,
            brand: row.brand,
            source_url: row.source_url,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PartRow {
    part_number: String,
    manufacturer_part_number: Option<String>,
    name: String,
    description: String,
    price: Option<f64>,
    manufacturer: Option<String>,
    appliance_type: String,
    source_url: String,
}

impl TryFrom<PartRow> for Part {
    type Error = AppError;

    fn try_from(row: PartRow) -> Result<Self, Self::Error> {
        Ok(Part {
            appliance_type: row.appliance_type.parse().map_err(AppError::DatabaseError)?,
            part_number: row.part_number,
            manufacturer_part_number: row.manufacturer_part_number,
            name: row.name,
            description: row.description,
            price: row.price,
            manufacturer: row.manufacturer,
            source_url: row.source_url,
        })
    }
}

// -- Trait implementation --

impl partscout_core::traits::CatalogStore for CatalogRepository {
    async fn replace_partition(
        &self,
        snapshot: &CatalogSnapshot,
    ) -> Result<ReplaceSummary, AppError> {
        CatalogRepository::replace_partition(self, snapshot).await
    }

    async fn partition_counts(
        &self,
        appliance: ApplianceType,
    ) -> Result<PartitionCounts, AppError> {
        CatalogRepository::partition_counts(self, appliance).await
    }
}
