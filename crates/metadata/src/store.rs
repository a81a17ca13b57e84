//! Store trait and the SQLite implementation.

use crate::error::{StoreError, StoreResult};
use crate::repos::{ExpressionRepo, GeneRepo, OAuthRepo, PhenotypeRepo, ScannerRepo, SpeciesRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined store trait.
#[async_trait]
pub trait MetadataStore:
    SpeciesRepo + PhenotypeRepo + ScannerRepo + GeneRepo + ExpressionRepo + OAuthRepo + Send + Sync
{
    /// Create tables and views if they do not exist.
    async fn migrate(&self) -> StoreResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> StoreResult<()>;
}

/// SQLite-backed store for development and tests.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) a SQLite database and apply the schema.
    ///
    /// `busy_timeout_secs` bounds how long a statement waits on a locked database.
    pub async fn new(path: impl AsRef<Path>, busy_timeout_secs: Option<u64>) -> StoreResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(busy_timeout_secs.unwrap_or(5)));

        let pool = SqlitePoolOptions::new()
            // SQLite serializes writers; one connection avoids "database is locked".
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::info!(path = %path.display(), "Opened SQLite store");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;

    const PLANT_COLUMNS: &str =
        "p.id, p.wave_id, p.accession_id, p.qr_code, p.germ_day, p.germ_day_color";

    impl SqliteStore {
        /// Attach scans and first-frame images to plants.
        async fn load_plant_tree(&self, plants: Vec<PlantRow>) -> StoreResult<Vec<PlantWithScans>> {
            if plants.is_empty() {
                return Ok(Vec::new());
            }

            let mut qb = QueryBuilder::<Sqlite>::new(
                "SELECT id, plant_id, scanner_id, plant_age_days, date_scanned FROM cyl_scans WHERE plant_id IN (",
            );
            let mut ids = qb.separated(", ");
            for plant in &plants {
                ids.push_bind(plant.id);
            }
            ids.push_unseparated(")");
            let scans: Vec<ScanRow> = qb.build_query_as().fetch_all(&self.pool).await?;

            let images: Vec<ImageRow> = if scans.is_empty() {
                Vec::new()
            } else {
                let mut qb = QueryBuilder::<Sqlite>::new(
                    "SELECT id, scan_id, frame_number, object_path, status FROM cyl_images WHERE frame_number = 1 AND scan_id IN (",
                );
                let mut ids = qb.separated(", ");
                for scan in &scans {
                    ids.push_bind(scan.id);
                }
                ids.push_unseparated(")");
                qb.build_query_as().fetch_all(&self.pool).await?
            };

            Ok(assemble_plants(plants, scans, images))
        }
    }

    #[async_trait]
    impl SpeciesRepo for SqliteStore {
        async fn create_species(
            &self,
            common_name: &str,
            genus: Option<&str>,
            species: Option<&str>,
            illustration_path: &str,
        ) -> StoreResult<i64> {
            sqlx::query_scalar(
                "INSERT INTO species (common_name, genus, species, illustration_path) VALUES (?, ?, ?, ?) RETURNING id",
            )
            .bind(common_name)
            .bind(genus)
            .bind(species)
            .bind(illustration_path)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::from_insert(e, format!("species {common_name}")))
        }

        async fn update_species_illustration(
            &self,
            common_name: &str,
            illustration_path: &str,
        ) -> StoreResult<()> {
            let result = sqlx::query("UPDATE species SET illustration_path = ? WHERE common_name = ?")
                .bind(illustration_path)
                .bind(common_name)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("species {common_name}")));
            }
            Ok(())
        }

        async fn list_species(&self) -> StoreResult<Vec<SpeciesRow>> {
            let rows = sqlx::query_as::<_, SpeciesRow>(
                "SELECT id, common_name, genus, species, illustration_path FROM species ORDER BY common_name",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn get_species(&self, id: i64) -> StoreResult<Option<SpeciesRow>> {
            let row = sqlx::query_as::<_, SpeciesRow>(
                "SELECT id, common_name, genus, species, illustration_path FROM species WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_species_with_experiments(&self) -> StoreResult<Vec<SpeciesSummaryRow>> {
            let rows = sqlx::query_as::<_, SpeciesSummaryRow>(
                r#"
                SELECT sp.id, sp.common_name, sp.genus, sp.species, sp.illustration_path,
                       COUNT(e.id) AS record_count
                FROM species sp
                JOIN cyl_experiments e ON e.species_id = sp.id AND NOT e.deleted
                GROUP BY sp.id, sp.common_name, sp.genus, sp.species, sp.illustration_path
                ORDER BY record_count DESC, sp.common_name
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl PhenotypeRepo for SqliteStore {
        async fn list_experiments(&self, species_id: i64) -> StoreResult<Vec<ExperimentRow>> {
            let rows = sqlx::query_as::<_, ExperimentRow>(
                r#"
                SELECT id, name, species_id, scientist_id, description, slack_channel_url, deleted, created_at
                FROM cyl_experiments
                WHERE species_id = ? AND NOT deleted
                ORDER BY name
                "#,
            )
            .bind(species_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn experiment_names(&self, species_id: i64) -> StoreResult<Vec<String>> {
            let names = sqlx::query_scalar(
                "SELECT name FROM cyl_experiments WHERE species_id = ? AND NOT deleted ORDER BY name",
            )
            .bind(species_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(names)
        }

        async fn list_all_experiments(&self) -> StoreResult<Vec<ExperimentDetailRow>> {
            let rows = sqlx::query_as::<_, ExperimentDetailRow>(
                r#"
                SELECT e.id, e.name, e.species_id, sp.common_name AS species_common_name,
                       e.description, e.slack_channel_url,
                       p.name AS scientist_name, p.email AS scientist_email
                FROM cyl_experiments e
                JOIN species sp ON sp.id = e.species_id
                LEFT JOIN people p ON p.id = e.scientist_id
                WHERE NOT e.deleted
                ORDER BY sp.common_name, e.name
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn get_experiment(&self, id: i64) -> StoreResult<Option<ExperimentDetailRow>> {
            let row = sqlx::query_as::<_, ExperimentDetailRow>(
                r#"
                SELECT e.id, e.name, e.species_id, sp.common_name AS species_common_name,
                       e.description, e.slack_channel_url,
                       p.name AS scientist_name, p.email AS scientist_email
                FROM cyl_experiments e
                JOIN species sp ON sp.id = e.species_id
                LEFT JOIN people p ON p.id = e.scientist_id
                WHERE e.id = ?
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn experiment_plants(&self, experiment_id: i64) -> StoreResult<Vec<ExperimentPlantRow>> {
            let rows = sqlx::query_as::<_, ExperimentPlantRow>(
                r#"
                SELECT p.id AS plant_id, p.qr_code, w.id AS wave_id, w.number AS wave_number,
                       w.name AS wave_name, a.id AS accession_id, a.name AS accession_name
                FROM cyl_plants p
                JOIN cyl_waves w ON w.id = p.wave_id
                LEFT JOIN accessions a ON a.id = p.accession_id
                WHERE w.experiment_id = ?
                ORDER BY w.number, a.name, p.id
                "#,
            )
            .bind(experiment_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn wave_accession_plants(
            &self,
            wave_id: i64,
            accession_id: i64,
        ) -> StoreResult<Vec<PlantWithScans>> {
            let plants = sqlx::query_as::<_, PlantRow>(&format!(
                "SELECT {PLANT_COLUMNS} FROM cyl_plants p WHERE p.wave_id = ? AND p.accession_id = ? ORDER BY p.qr_code"
            ))
            .bind(wave_id)
            .bind(accession_id)
            .fetch_all(&self.pool)
            .await?;
            self.load_plant_tree(plants).await
        }

        async fn accession_plants(
            &self,
            experiment_id: i64,
            accession_name: &str,
        ) -> StoreResult<Vec<PlantWithScans>> {
            let plants = sqlx::query_as::<_, PlantRow>(&format!(
                r#"
                SELECT {PLANT_COLUMNS}
                FROM cyl_plants p
                JOIN cyl_waves w ON w.id = p.wave_id
                JOIN accessions a ON a.id = p.accession_id
                WHERE w.experiment_id = ? AND a.name = ?
                ORDER BY p.qr_code
                "#
            ))
            .bind(experiment_id)
            .bind(accession_name)
            .fetch_all(&self.pool)
            .await?;
            self.load_plant_tree(plants).await
        }

        async fn get_scan(&self, scan_id: i64) -> StoreResult<Option<ScanDetail>> {
            let context = sqlx::query_as::<_, ScanContextRow>(
                r#"
                SELECT s.id AS scan_id, p.id AS plant_id, s.plant_age_days, s.date_scanned,
                       p.qr_code, a.name AS accession_name, w.number AS wave_number,
                       w.experiment_id, sc.name AS scanner_name
                FROM cyl_scans s
                JOIN cyl_plants p ON p.id = s.plant_id
                JOIN cyl_waves w ON w.id = p.wave_id
                LEFT JOIN accessions a ON a.id = p.accession_id
                LEFT JOIN cyl_scanners sc ON sc.id = s.scanner_id
                WHERE s.id = ?
                "#,
            )
            .bind(scan_id)
            .fetch_optional(&self.pool)
            .await?;

            let Some(context) = context else {
                return Ok(None);
            };

            let images = sqlx::query_as::<_, ImageRow>(
                "SELECT id, scan_id, frame_number, object_path, status FROM cyl_images WHERE scan_id = ? ORDER BY frame_number",
            )
            .bind(scan_id)
            .fetch_all(&self.pool)
            .await?;

            Ok(Some(ScanDetail { context, images }))
        }

        async fn get_image(&self, image_id: i64) -> StoreResult<Option<ImageContextRow>> {
            let row = sqlx::query_as::<_, ImageContextRow>(
                r#"
                SELECT i.id AS image_id, i.object_path, i.frame_number, s.id AS scan_id,
                       s.plant_age_days, s.date_scanned, p.qr_code
                FROM cyl_images i
                JOIN cyl_scans s ON s.id = i.scan_id
                JOIN cyl_plants p ON p.id = s.plant_id
                WHERE i.id = ?
                "#,
            )
            .bind(image_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn wave_timeline(&self) -> StoreResult<Vec<WaveTimelineRow>> {
            let rows = sqlx::query_as::<_, WaveTimelineRow>(
                r#"
                SELECT date_scanned, species_name, experiment_name, wave_number, count
                FROM cyl_wave_timeline
                ORDER BY date_scanned DESC, experiment_name, wave_number
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn experiment_trait_values(
            &self,
            experiment_id: i64,
        ) -> StoreResult<Vec<TraitValueRow>> {
            let rows = sqlx::query_as::<_, TraitValueRow>(
                r#"
                SELECT t.name AS trait_name, a.name AS accession_name, st.value
                FROM cyl_scan_traits st
                JOIN cyl_traits t ON t.id = st.trait_id
                JOIN cyl_scans s ON s.id = st.scan_id
                JOIN cyl_plants p ON p.id = s.plant_id
                JOIN cyl_waves w ON w.id = p.wave_id
                JOIN accessions a ON a.id = p.accession_id
                WHERE w.experiment_id = ? AND st.value IS NOT NULL
                ORDER BY t.name, a.name
                "#,
            )
            .bind(experiment_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn insert_image_metadata(&self, metadata: &NewImageMetadata) -> StoreResult<i64> {
            let meta = metadata.validate()?;
            let now = OffsetDateTime::now_utc();
            let (first_name, last_name) = meta.phenotyper_first_last();

            let mut tx = self.pool.begin().await?;

            let species_id: i64 = sqlx::query_scalar(
                "INSERT INTO species (common_name, illustration_path) VALUES (?, '') ON CONFLICT(common_name) DO UPDATE SET common_name = excluded.common_name RETURNING id",
            )
            .bind(&meta.species)
            .fetch_one(&mut *tx)
            .await?;

            let scientist_id: i64 = sqlx::query_scalar(
                "INSERT INTO people (name, email) VALUES (?, ?) ON CONFLICT(email) DO UPDATE SET name = excluded.name RETURNING id",
            )
            .bind(&meta.scientist_name)
            .bind(&meta.scientist_email)
            .fetch_one(&mut *tx)
            .await?;

            let phenotyper_id: i64 = sqlx::query_scalar(
                "INSERT INTO phenotypers (first_name, last_name, email) VALUES (?, ?, ?) ON CONFLICT(email) DO UPDATE SET first_name = excluded.first_name, last_name = excluded.last_name RETURNING id",
            )
            .bind(&first_name)
            .bind(&last_name)
            .bind(&meta.phenotyper_email)
            .fetch_one(&mut *tx)
            .await?;

            let experiment_id: i64 = sqlx::query_scalar(
                "INSERT INTO cyl_experiments (name, species_id, scientist_id, deleted, created_at) VALUES (?, ?, ?, ?, ?) ON CONFLICT(species_id, name) DO UPDATE SET scientist_id = excluded.scientist_id RETURNING id",
            )
            .bind(&meta.experiment)
            .bind(species_id)
            .bind(scientist_id)
            .bind(false)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

            let wave_id: i64 = sqlx::query_scalar(
                "INSERT INTO cyl_waves (experiment_id, number) VALUES (?, ?) ON CONFLICT(experiment_id, number) DO UPDATE SET number = excluded.number RETURNING id",
            )
            .bind(experiment_id)
            .bind(meta.wave_number)
            .fetch_one(&mut *tx)
            .await?;

            let accession_id: i64 = sqlx::query_scalar(
                "INSERT INTO accessions (name, created_at) VALUES (?, ?) ON CONFLICT(name) DO UPDATE SET name = excluded.name RETURNING id",
            )
            .bind(&meta.accession_name)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

            let plant_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO cyl_plants (wave_id, accession_id, qr_code, germ_day, germ_day_color, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(wave_id, qr_code) DO UPDATE SET
                    accession_id = excluded.accession_id,
                    germ_day = excluded.germ_day,
                    germ_day_color = excluded.germ_day_color
                RETURNING id
                "#,
            )
            .bind(wave_id)
            .bind(accession_id)
            .bind(&meta.plant_qr_code)
            .bind(meta.germ_day)
            .bind(&meta.germ_day_color)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

            let scanner_id: i64 = sqlx::query_scalar(
                "INSERT INTO cyl_scanners (name) VALUES (?) ON CONFLICT(name) DO UPDATE SET name = excluded.name RETURNING id",
            )
            .bind(&meta.device_name)
            .fetch_one(&mut *tx)
            .await?;

            let scan_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO cyl_scans (plant_id, scanner_id, phenotyper_id, scientist_id, plant_age_days, date_scanned, uploaded_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(plant_id, date_scanned) DO UPDATE SET
                    scanner_id = excluded.scanner_id,
                    phenotyper_id = excluded.phenotyper_id,
                    scientist_id = excluded.scientist_id,
                    plant_age_days = excluded.plant_age_days
                RETURNING id
                "#,
            )
            .bind(plant_id)
            .bind(scanner_id)
            .bind(phenotyper_id)
            .bind(scientist_id)
            .bind(meta.plant_age_days)
            .bind(meta.date_scanned)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

            let image_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO cyl_images (scan_id, frame_number, status, date_scanned, uploaded_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(scan_id, frame_number) DO UPDATE SET
                    status = excluded.status,
                    uploaded_at = excluded.uploaded_at
                RETURNING id
                "#,
            )
            .bind(scan_id)
            .bind(meta.frame_number)
            .bind(IMAGE_STATUS_PENDING)
            .bind(meta.date_scanned)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(image_id)
        }

        async fn update_image(
            &self,
            image_id: i64,
            object_path: &str,
            status: &str,
        ) -> StoreResult<()> {
            let result = sqlx::query("UPDATE cyl_images SET object_path = ?, status = ? WHERE id = ?")
                .bind(object_path)
                .bind(status)
                .bind(image_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("image {image_id}")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ScannerRepo for SqliteStore {
        async fn list_scanners(&self) -> StoreResult<Vec<ScannerRow>> {
            let rows =
                sqlx::query_as::<_, ScannerRow>("SELECT id, name FROM cyl_scanners ORDER BY name")
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows)
        }

        async fn add_scanner(&self, name: &str) -> StoreResult<i64> {
            sqlx::query_scalar("INSERT INTO cyl_scanners (name) VALUES (?) RETURNING id")
                .bind(name)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::from_insert(e, format!("scanner {name}")))
        }

        async fn delete_scanner(&self, name: &str) -> StoreResult<()> {
            let result = sqlx::query("DELETE FROM cyl_scanners WHERE name = ?")
                .bind(name)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("scanner {name}")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl GeneRepo for SqliteStore {
        async fn list_gene_candidates(&self) -> StoreResult<Vec<GeneCandidateRow>> {
            let rows = sqlx::query_as::<_, GeneCandidateRow>(
                r#"
                SELECT gc.gene, gc.category, gc.status, gc.created_at, gc.evidence_description,
                       gc.disclosed_to_otd, gc.publication_status, gc.translation_approval_date,
                       p.name AS scientist_name, p.email AS scientist_email,
                       g.standard_name, g.symbol, g.short_description
                FROM gene_candidates gc
                LEFT JOIN people p ON p.id = gc.scientist_id
                LEFT JOIN genes g ON g.gene_id = gc.gene
                ORDER BY gc.created_at DESC, gc.category, gc.gene
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn list_translation_projects(&self) -> StoreResult<Vec<TranslationProjectRow>> {
            let rows = sqlx::query_as::<_, TranslationProjectRow>(
                "SELECT id, name, spreadsheet_url, created_at FROM translation_projects ORDER BY name",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn list_people(&self) -> StoreResult<Vec<PersonRow>> {
            let rows = sqlx::query_as::<_, PersonRow>("SELECT id, name, email FROM people ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }
    }

    const DATASET_SELECT: &str = r#"
        SELECT d.id, d.name, d.species_id, sp.common_name AS species_common_name,
               p.name AS scientist_name, p.email AS scientist_email,
               d.assembly, d.annotation, d.strain, d.url, d.metadata
        FROM scrna_datasets d
        LEFT JOIN species sp ON sp.id = d.species_id
        LEFT JOIN people p ON p.id = d.scientist_id
    "#;

    #[async_trait]
    impl ExpressionRepo for SqliteStore {
        async fn species_with_datasets(&self) -> StoreResult<Vec<SpeciesSummaryRow>> {
            let rows = sqlx::query_as::<_, SpeciesSummaryRow>(
                r#"
                SELECT sp.id, sp.common_name, sp.genus, sp.species, sp.illustration_path,
                       COUNT(d.id) AS record_count
                FROM species sp
                JOIN scrna_datasets d ON d.species_id = sp.id
                GROUP BY sp.id, sp.common_name, sp.genus, sp.species, sp.illustration_path
                ORDER BY sp.common_name
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn list_datasets(&self, species_id: i64) -> StoreResult<Vec<DatasetRow>> {
            let rows = sqlx::query_as::<_, DatasetRow>(&format!(
                "{DATASET_SELECT} WHERE d.species_id = ? ORDER BY d.name"
            ))
            .bind(species_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn get_dataset(&self, id: i64) -> StoreResult<Option<DatasetRow>> {
            let row = sqlx::query_as::<_, DatasetRow>(&format!("{DATASET_SELECT} WHERE d.id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn create_dataset(&self, dataset: &NewDataset) -> StoreResult<i64> {
            let id = sqlx::query_scalar(
                r#"
                INSERT INTO scrna_datasets (name, species_id, scientist_id, url, assembly, annotation, strain, metadata)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(&dataset.name)
            .bind(dataset.species_id)
            .bind(dataset.scientist_id)
            .bind(&dataset.url)
            .bind(&dataset.assembly)
            .bind(&dataset.annotation)
            .bind(&dataset.strain)
            .bind(&dataset.metadata)
            .fetch_one(&self.pool)
            .await?;
            Ok(id)
        }

        async fn insert_genes(&self, dataset_id: i64, names: &[String]) -> StoreResult<u64> {
            let mut tx = self.pool.begin().await?;
            for (number, name) in names.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO scrna_genes (dataset_id, gene_name, gene_number) VALUES (?, ?, ?)",
                )
                .bind(dataset_id)
                .bind(name)
                .bind(number as i64)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            Ok(names.len() as u64)
        }

        async fn insert_cells(&self, dataset_id: i64, cells: &[NewCell]) -> StoreResult<u64> {
            let mut tx = self.pool.begin().await?;
            for (number, cell) in cells.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO scrna_cells (dataset_id, cell_number, barcode, x, y, cluster_id) VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(dataset_id)
                .bind(number as i64)
                .bind(&cell.barcode)
                .bind(cell.x)
                .bind(cell.y)
                .bind(&cell.cluster_id)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            Ok(cells.len() as u64)
        }

        async fn find_gene(
            &self,
            dataset_id: i64,
            gene_number: i64,
        ) -> StoreResult<Option<ScrnaGeneRow>> {
            let row = sqlx::query_as::<_, ScrnaGeneRow>(
                "SELECT id, dataset_id, gene_name, gene_number FROM scrna_genes WHERE dataset_id = ? AND gene_number = ?",
            )
            .bind(dataset_id)
            .bind(gene_number)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn insert_counts(
            &self,
            dataset_id: i64,
            gene_id: i64,
            counts_object_path: &str,
        ) -> StoreResult<i64> {
            let id = sqlx::query_scalar(
                "INSERT INTO scrna_counts (dataset_id, gene_id, counts_object_path) VALUES (?, ?, ?) RETURNING id",
            )
            .bind(dataset_id)
            .bind(gene_id)
            .bind(counts_object_path)
            .fetch_one(&self.pool)
            .await?;
            Ok(id)
        }

        async fn dataset_genes(&self, dataset_id: i64) -> StoreResult<Vec<ScrnaGeneRow>> {
            let rows = sqlx::query_as::<_, ScrnaGeneRow>(
                "SELECT id, dataset_id, gene_name, gene_number FROM scrna_genes WHERE dataset_id = ? ORDER BY gene_number",
            )
            .bind(dataset_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn dataset_cells(&self, dataset_id: i64) -> StoreResult<Vec<ScrnaCellRow>> {
            let rows = sqlx::query_as::<_, ScrnaCellRow>(
                "SELECT id, dataset_id, cell_number, barcode, x, y, cluster_id FROM scrna_cells WHERE dataset_id = ? ORDER BY cell_number",
            )
            .bind(dataset_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl OAuthRepo for SqliteStore {
        async fn replace_flow_state(&self, flow: &NewFlowState) -> StoreResult<()> {
            let mut tx = self.pool.begin().await?;

            sqlx::query("DELETE FROM oauth_flow_state WHERE user_id = ? AND provider = ?")
                .bind(&flow.user_id)
                .bind(&flow.provider)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                INSERT INTO oauth_flow_state (user_id, provider, state, code_verifier, code_challenge, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&flow.user_id)
            .bind(&flow.provider)
            .bind(&flow.state)
            .bind(&flow.code_verifier)
            .bind(&flow.code_challenge)
            .bind(flow.created_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        }

        async fn get_flow_state(
            &self,
            user_id: &str,
            provider: &str,
            state: &str,
        ) -> StoreResult<Option<FlowStateRow>> {
            let row = sqlx::query_as::<_, FlowStateRow>(
                "SELECT * FROM oauth_flow_state WHERE user_id = ? AND provider = ? AND state = ?",
            )
            .bind(user_id)
            .bind(provider)
            .bind(state)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn count_flow_states(&self, user_id: &str, provider: &str) -> StoreResult<u64> {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM oauth_flow_state WHERE user_id = ? AND provider = ?",
            )
            .bind(user_id)
            .bind(provider)
            .fetch_one(&self.pool)
            .await?;
            Ok(count as u64)
        }

        async fn replace_tokens(&self, tokens: &NewOAuthTokens) -> StoreResult<()> {
            let mut tx = self.pool.begin().await?;

            sqlx::query("DELETE FROM oauth_tokens WHERE user_id = ? AND provider = ?")
                .bind(&tokens.user_id)
                .bind(&tokens.provider)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                INSERT INTO oauth_tokens (user_id, provider, encrypted_access_token, encrypted_refresh_token, created_at, expires_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&tokens.user_id)
            .bind(&tokens.provider)
            .bind(&tokens.encrypted_access_token)
            .bind(&tokens.encrypted_refresh_token)
            .bind(tokens.created_at)
            .bind(tokens.expires_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        }

        async fn get_tokens(
            &self,
            user_id: &str,
            provider: &str,
        ) -> StoreResult<Option<OAuthTokensRow>> {
            let row = sqlx::query_as::<_, OAuthTokensRow>(
                "SELECT * FROM oauth_tokens WHERE user_id = ? AND provider = ?",
            )
            .bind(user_id)
            .bind(provider)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- Reference data
CREATE TABLE IF NOT EXISTS species (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    common_name TEXT NOT NULL UNIQUE,
    genus TEXT,
    species TEXT,
    illustration_path TEXT
);

CREATE TABLE IF NOT EXISTS people (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    email TEXT UNIQUE
);

CREATE TABLE IF NOT EXISTS phenotypers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT,
    last_name TEXT,
    email TEXT UNIQUE,
    user_id TEXT
);

CREATE TABLE IF NOT EXISTS accessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS assemblies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    species_id INTEGER REFERENCES species(id),
    accession_name TEXT,
    prefix TEXT,
    version TEXT,
    hpi_assembly BOOLEAN,
    hpi_reference_id TEXT,
    origin TEXT,
    archive_link TEXT,
    external_link TEXT,
    external_version TEXT
);

-- Cylinder phenotyping
CREATE TABLE IF NOT EXISTS cyl_experiments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    species_id INTEGER NOT NULL REFERENCES species(id),
    scientist_id INTEGER REFERENCES people(id),
    description TEXT,
    slack_channel_url TEXT,
    deleted BOOLEAN NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE (species_id, name)
);

CREATE TABLE IF NOT EXISTS cyl_waves (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    experiment_id INTEGER NOT NULL REFERENCES cyl_experiments(id),
    name TEXT,
    number INTEGER,
    UNIQUE (experiment_id, number)
);

CREATE TABLE IF NOT EXISTS cyl_plants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    wave_id INTEGER REFERENCES cyl_waves(id),
    accession_id INTEGER REFERENCES accessions(id),
    qr_code TEXT,
    germ_day INTEGER,
    germ_day_color TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (wave_id, qr_code)
);
CREATE INDEX IF NOT EXISTS idx_cyl_plants_accession ON cyl_plants(accession_id);

CREATE TABLE IF NOT EXISTS cyl_scanners (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS cyl_camera_settings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scanner_gain REAL,
    scanner_exposure_time REAL,
    scanner_brightness REAL,
    scanner_contrast REAL,
    scanner_gamma REAL,
    scanner_seconds_per_rot REAL
);

CREATE TABLE IF NOT EXISTS cyl_scans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    plant_id INTEGER NOT NULL REFERENCES cyl_plants(id),
    scanner_id INTEGER REFERENCES cyl_scanners(id) ON DELETE SET NULL,
    phenotyper_id INTEGER REFERENCES phenotypers(id),
    scientist_id INTEGER REFERENCES people(id),
    plant_age_days INTEGER,
    date_scanned DATE,
    uploaded_at TEXT,
    cyl_camera_settings_id INTEGER REFERENCES cyl_camera_settings(id),
    UNIQUE (plant_id, date_scanned)
);

CREATE TABLE IF NOT EXISTS cyl_images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_id INTEGER NOT NULL REFERENCES cyl_scans(id),
    frame_number INTEGER NOT NULL,
    object_path TEXT,
    status TEXT,
    date_scanned DATE,
    uploaded_at TEXT,
    UNIQUE (scan_id, frame_number)
);

CREATE TABLE IF NOT EXISTS cyl_trait_sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS cyl_traits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS cyl_scan_traits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_id INTEGER NOT NULL REFERENCES cyl_scans(id),
    trait_id INTEGER NOT NULL REFERENCES cyl_traits(id),
    source_id INTEGER REFERENCES cyl_trait_sources(id),
    value REAL
);
CREATE INDEX IF NOT EXISTS idx_cyl_scan_traits_scan ON cyl_scan_traits(scan_id);

CREATE VIEW IF NOT EXISTS cyl_wave_timeline AS
SELECT s.date_scanned AS date_scanned,
       sp.common_name AS species_name,
       e.name AS experiment_name,
       w.number AS wave_number,
       COUNT(DISTINCT s.plant_id) AS count
FROM cyl_scans s
JOIN cyl_plants p ON p.id = s.plant_id
JOIN cyl_waves w ON w.id = p.wave_id
JOIN cyl_experiments e ON e.id = w.experiment_id
JOIN species sp ON sp.id = e.species_id
WHERE NOT e.deleted
GROUP BY s.date_scanned, sp.common_name, e.name, w.number;

-- Genes and translation
CREATE TABLE IF NOT EXISTS genes (
    gene_id TEXT PRIMARY KEY,
    ortho_group TEXT,
    standard_name TEXT,
    symbol TEXT,
    short_id TEXT,
    short_description TEXT,
    long_description TEXT,
    reference_id INTEGER REFERENCES assemblies(id)
);

CREATE TABLE IF NOT EXISTS gene_candidates (
    gene TEXT PRIMARY KEY,
    category TEXT,
    status TEXT,
    created_at TEXT,
    evidence_description TEXT,
    disclosed_to_otd BOOLEAN,
    publication_status TEXT,
    translation_approval_date DATE,
    scientist_id INTEGER REFERENCES people(id)
);

CREATE TABLE IF NOT EXISTS translation_projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    spreadsheet_url TEXT,
    created_at TEXT NOT NULL
);

-- Single-cell RNA expression
CREATE TABLE IF NOT EXISTS scrna_datasets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    species_id INTEGER NOT NULL REFERENCES species(id),
    scientist_id INTEGER REFERENCES people(id),
    url TEXT,
    assembly TEXT,
    annotation TEXT,
    strain TEXT,
    metadata TEXT
);

CREATE TABLE IF NOT EXISTS scrna_genes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    dataset_id INTEGER NOT NULL REFERENCES scrna_datasets(id) ON DELETE CASCADE,
    gene_name TEXT NOT NULL,
    gene_number INTEGER NOT NULL,
    UNIQUE (dataset_id, gene_number)
);

CREATE TABLE IF NOT EXISTS scrna_cells (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    dataset_id INTEGER NOT NULL REFERENCES scrna_datasets(id) ON DELETE CASCADE,
    cell_number INTEGER NOT NULL,
    barcode TEXT NOT NULL,
    x REAL NOT NULL,
    y REAL NOT NULL,
    cluster_id TEXT
);
CREATE INDEX IF NOT EXISTS idx_scrna_cells_dataset ON scrna_cells(dataset_id, cell_number);

CREATE TABLE IF NOT EXISTS scrna_counts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    dataset_id INTEGER NOT NULL REFERENCES scrna_datasets(id) ON DELETE CASCADE,
    gene_id INTEGER NOT NULL REFERENCES scrna_genes(id) ON DELETE CASCADE,
    counts_object_path TEXT NOT NULL
);

-- OAuth: one pending flow and one token row per (user, provider)
CREATE TABLE IF NOT EXISTS oauth_flow_state (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    provider TEXT NOT NULL,
    state TEXT NOT NULL,
    code_verifier TEXT NOT NULL,
    code_challenge TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (user_id, provider)
);

CREATE TABLE IF NOT EXISTS oauth_tokens (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    provider TEXT NOT NULL,
    encrypted_access_token TEXT NOT NULL,
    encrypted_refresh_token TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    UNIQUE (user_id, provider)
);
"#;
