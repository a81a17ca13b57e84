//! PostgreSQL-based store implementation.

use crate::error::{StoreError, StoreResult};
use crate::models::*;
use crate::repos::{ExpressionRepo, GeneRepo, OAuthRepo, PhenotypeRepo, ScannerRepo, SpeciesRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use bloom_core::config::PgSslMode;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based store.
///
/// In production this points at the managed backend's database, so the
/// schema uses `IF NOT EXISTS` throughout and never drops anything.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> StoreResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    ///
    /// Lets the password arrive separately, e.g. through `BLOOM_STORE__PASSWORD`.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> StoreResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        // Log connection info without password
        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> StoreResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    /// Attach scans and first-frame images to plants.
    async fn load_plant_tree(&self, plants: Vec<PlantRow>) -> StoreResult<Vec<PlantWithScans>> {
        if plants.is_empty() {
            return Ok(Vec::new());
        }

        let plant_ids: Vec<i64> = plants.iter().map(|p| p.id).collect();
        let scans = sqlx::query_as::<_, ScanRow>(
            "SELECT id, plant_id, scanner_id, plant_age_days, date_scanned FROM cyl_scans WHERE plant_id = ANY($1)",
        )
        .bind(&plant_ids)
        .fetch_all(&self.pool)
        .await?;

        let scan_ids: Vec<i64> = scans.iter().map(|s| s.id).collect();
        let images = sqlx::query_as::<_, ImageRow>(
            "SELECT id, scan_id, frame_number, object_path, status FROM cyl_images WHERE frame_number = 1 AND scan_id = ANY($1)",
        )
        .bind(&scan_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(assemble_plants(plants, scans, images))
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> StoreResult<()> {
        // Prepared statements cannot hold more than one command.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl SpeciesRepo for PostgresStore {
    async fn create_species(
        &self,
        common_name: &str,
        genus: Option<&str>,
        species: Option<&str>,
        illustration_path: &str,
    ) -> StoreResult<i64> {
        sqlx::query_scalar(
            "INSERT INTO species (common_name, genus, species, illustration_path) VALUES ($1, $2, $3, $4) RETURNING id",
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
        let result = sqlx::query("UPDATE species SET illustration_path = $1 WHERE common_name = $2")
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
            "SELECT id, common_name, genus, species, illustration_path FROM species WHERE id = $1",
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
impl PhenotypeRepo for PostgresStore {
    async fn list_experiments(&self, species_id: i64) -> StoreResult<Vec<ExperimentRow>> {
        let rows = sqlx::query_as::<_, ExperimentRow>(
            r#"
            SELECT id, name, species_id, scientist_id, description, slack_channel_url, deleted, created_at
            FROM cyl_experiments
            WHERE species_id = $1 AND NOT deleted
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
            "SELECT name FROM cyl_experiments WHERE species_id = $1 AND NOT deleted ORDER BY name",
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
            WHERE e.id = $1
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
            WHERE w.experiment_id = $1
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
        let plants = sqlx::query_as::<_, PlantRow>(
            r#"
            SELECT id, wave_id, accession_id, qr_code, germ_day, germ_day_color
            FROM cyl_plants
            WHERE wave_id = $1 AND accession_id = $2
            ORDER BY qr_code
            "#,
        )
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
        let plants = sqlx::query_as::<_, PlantRow>(
            r#"
            SELECT p.id, p.wave_id, p.accession_id, p.qr_code, p.germ_day, p.germ_day_color
            FROM cyl_plants p
            JOIN cyl_waves w ON w.id = p.wave_id
            JOIN accessions a ON a.id = p.accession_id
            WHERE w.experiment_id = $1 AND a.name = $2
            ORDER BY p.qr_code
            "#,
        )
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
            WHERE s.id = $1
            "#,
        )
        .bind(scan_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(context) = context else {
            return Ok(None);
        };

        let images = sqlx::query_as::<_, ImageRow>(
            "SELECT id, scan_id, frame_number, object_path, status FROM cyl_images WHERE scan_id = $1 ORDER BY frame_number",
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
            WHERE i.id = $1
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

    async fn experiment_trait_values(&self, experiment_id: i64) -> StoreResult<Vec<TraitValueRow>> {
        let rows = sqlx::query_as::<_, TraitValueRow>(
            r#"
            SELECT t.name AS trait_name, a.name AS accession_name, st.value
            FROM cyl_scan_traits st
            JOIN cyl_traits t ON t.id = st.trait_id
            JOIN cyl_scans s ON s.id = st.scan_id
            JOIN cyl_plants p ON p.id = s.plant_id
            JOIN cyl_waves w ON w.id = p.wave_id
            JOIN accessions a ON a.id = p.accession_id
            WHERE w.experiment_id = $1 AND st.value IS NOT NULL
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
            "INSERT INTO species (common_name, illustration_path) VALUES ($1, '') ON CONFLICT (common_name) DO UPDATE SET common_name = EXCLUDED.common_name RETURNING id",
        )
        .bind(&meta.species)
        .fetch_one(&mut *tx)
        .await?;

        let scientist_id: i64 = sqlx::query_scalar(
            "INSERT INTO people (name, email) VALUES ($1, $2) ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name RETURNING id",
        )
        .bind(&meta.scientist_name)
        .bind(&meta.scientist_email)
        .fetch_one(&mut *tx)
        .await?;

        let phenotyper_id: i64 = sqlx::query_scalar(
            "INSERT INTO phenotypers (first_name, last_name, email) VALUES ($1, $2, $3) ON CONFLICT (email) DO UPDATE SET first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name RETURNING id",
        )
        .bind(&first_name)
        .bind(&last_name)
        .bind(&meta.phenotyper_email)
        .fetch_one(&mut *tx)
        .await?;

        let experiment_id: i64 = sqlx::query_scalar(
            "INSERT INTO cyl_experiments (name, species_id, scientist_id, deleted, created_at) VALUES ($1, $2, $3, FALSE, $4) ON CONFLICT (species_id, name) DO UPDATE SET scientist_id = EXCLUDED.scientist_id RETURNING id",
        )
        .bind(&meta.experiment)
        .bind(species_id)
        .bind(scientist_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let wave_id: i64 = sqlx::query_scalar(
            "INSERT INTO cyl_waves (experiment_id, number) VALUES ($1, $2) ON CONFLICT (experiment_id, number) DO UPDATE SET number = EXCLUDED.number RETURNING id",
        )
        .bind(experiment_id)
        .bind(meta.wave_number)
        .fetch_one(&mut *tx)
        .await?;

        let accession_id: i64 = sqlx::query_scalar(
            "INSERT INTO accessions (name, created_at) VALUES ($1, $2) ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name RETURNING id",
        )
        .bind(&meta.accession_name)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let plant_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO cyl_plants (wave_id, accession_id, qr_code, germ_day, germ_day_color, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (wave_id, qr_code) DO UPDATE SET
                accession_id = EXCLUDED.accession_id,
                germ_day = EXCLUDED.germ_day,
                germ_day_color = EXCLUDED.germ_day_color
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
            "INSERT INTO cyl_scanners (name) VALUES ($1) ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name RETURNING id",
        )
        .bind(&meta.device_name)
        .fetch_one(&mut *tx)
        .await?;

        let scan_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO cyl_scans (plant_id, scanner_id, phenotyper_id, scientist_id, plant_age_days, date_scanned, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (plant_id, date_scanned) DO UPDATE SET
                scanner_id = EXCLUDED.scanner_id,
                phenotyper_id = EXCLUDED.phenotyper_id,
                scientist_id = EXCLUDED.scientist_id,
                plant_age_days = EXCLUDED.plant_age_days
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
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (scan_id, frame_number) DO UPDATE SET
                status = EXCLUDED.status,
                uploaded_at = EXCLUDED.uploaded_at
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

    async fn update_image(&self, image_id: i64, object_path: &str, status: &str) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE cyl_images SET object_path = $1, status = $2 WHERE id = $3")
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
impl ScannerRepo for PostgresStore {
    async fn list_scanners(&self) -> StoreResult<Vec<ScannerRow>> {
        let rows = sqlx::query_as::<_, ScannerRow>("SELECT id, name FROM cyl_scanners ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn add_scanner(&self, name: &str) -> StoreResult<i64> {
        sqlx::query_scalar("INSERT INTO cyl_scanners (name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::from_insert(e, format!("scanner {name}")))
    }

    async fn delete_scanner(&self, name: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM cyl_scanners WHERE name = $1")
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
impl GeneRepo for PostgresStore {
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
            ORDER BY gc.created_at DESC NULLS LAST, gc.category, gc.gene
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
impl ExpressionRepo for PostgresStore {
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
            "{DATASET_SELECT} WHERE d.species_id = $1 ORDER BY d.name"
        ))
        .bind(species_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_dataset(&self, id: i64) -> StoreResult<Option<DatasetRow>> {
        let row = sqlx::query_as::<_, DatasetRow>(&format!("{DATASET_SELECT} WHERE d.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn create_dataset(&self, dataset: &NewDataset) -> StoreResult<i64> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO scrna_datasets (name, species_id, scientist_id, url, assembly, annotation, strain, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
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
        let numbers: Vec<i64> = (0..names.len() as i64).collect();
        let result = sqlx::query(
            r#"
            INSERT INTO scrna_genes (dataset_id, gene_name, gene_number)
            SELECT $1, name, number FROM UNNEST($2::text[], $3::bigint[]) AS t(name, number)
            "#,
        )
        .bind(dataset_id)
        .bind(names)
        .bind(&numbers)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_cells(&self, dataset_id: i64, cells: &[NewCell]) -> StoreResult<u64> {
        let numbers: Vec<i64> = (0..cells.len() as i64).collect();
        let barcodes: Vec<&str> = cells.iter().map(|c| c.barcode.as_str()).collect();
        let xs: Vec<f64> = cells.iter().map(|c| c.x).collect();
        let ys: Vec<f64> = cells.iter().map(|c| c.y).collect();
        let clusters: Vec<Option<&str>> = cells.iter().map(|c| c.cluster_id.as_deref()).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO scrna_cells (dataset_id, cell_number, barcode, x, y, cluster_id)
            SELECT $1, number, barcode, x, y, cluster_id
            FROM UNNEST($2::bigint[], $3::text[], $4::float8[], $5::float8[], $6::text[])
                AS t(number, barcode, x, y, cluster_id)
            "#,
        )
        .bind(dataset_id)
        .bind(&numbers)
        .bind(&barcodes)
        .bind(&xs)
        .bind(&ys)
        .bind(&clusters)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn find_gene(&self, dataset_id: i64, gene_number: i64) -> StoreResult<Option<ScrnaGeneRow>> {
        let row = sqlx::query_as::<_, ScrnaGeneRow>(
            "SELECT id, dataset_id, gene_name, gene_number FROM scrna_genes WHERE dataset_id = $1 AND gene_number = $2",
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
            "INSERT INTO scrna_counts (dataset_id, gene_id, counts_object_path) VALUES ($1, $2, $3) RETURNING id",
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
            "SELECT id, dataset_id, gene_name, gene_number FROM scrna_genes WHERE dataset_id = $1 ORDER BY gene_number",
        )
        .bind(dataset_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn dataset_cells(&self, dataset_id: i64) -> StoreResult<Vec<ScrnaCellRow>> {
        let rows = sqlx::query_as::<_, ScrnaCellRow>(
            "SELECT id, dataset_id, cell_number, barcode, x, y, cluster_id FROM scrna_cells WHERE dataset_id = $1 ORDER BY cell_number",
        )
        .bind(dataset_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl OAuthRepo for PostgresStore {
    async fn replace_flow_state(&self, flow: &NewFlowState) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM oauth_flow_state WHERE user_id = $1 AND provider = $2")
            .bind(&flow.user_id)
            .bind(&flow.provider)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO oauth_flow_state (user_id, provider, state, code_verifier, code_challenge, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
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
            "SELECT * FROM oauth_flow_state WHERE user_id = $1 AND provider = $2 AND state = $3",
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
            "SELECT COUNT(*) FROM oauth_flow_state WHERE user_id = $1 AND provider = $2",
        )
        .bind(user_id)
        .bind(provider)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn replace_tokens(&self, tokens: &NewOAuthTokens) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM oauth_tokens WHERE user_id = $1 AND provider = $2")
            .bind(&tokens.user_id)
            .bind(&tokens.provider)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO oauth_tokens (user_id, provider, encrypted_access_token, encrypted_refresh_token, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
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

    async fn get_tokens(&self, user_id: &str, provider: &str) -> StoreResult<Option<OAuthTokensRow>> {
        let row = sqlx::query_as::<_, OAuthTokensRow>(
            "SELECT * FROM oauth_tokens WHERE user_id = $1 AND provider = $2",
        )
        .bind(user_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
