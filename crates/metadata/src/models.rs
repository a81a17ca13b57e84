//! Database models mapping to the Bloom schema.

use crate::error::{StoreError, StoreResult};
use serde::Serialize;
use sqlx::FromRow;
use std::collections::HashMap;
use time::{Date, OffsetDateTime};

// =============================================================================
// Species and people
// =============================================================================

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SpeciesRow {
    pub id: i64,
    pub common_name: String,
    pub genus: Option<String>,
    pub species: Option<String>,
    pub illustration_path: Option<String>,
}

/// Species with the number of related records (experiments or datasets).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SpeciesSummaryRow {
    pub id: i64,
    pub common_name: String,
    pub genus: Option<String>,
    pub species: Option<String>,
    pub illustration_path: Option<String>,
    pub record_count: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PersonRow {
    pub id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
}

// =============================================================================
// Cylinder phenotyping: experiments, waves, plants, scans, images
// =============================================================================

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ExperimentRow {
    pub id: i64,
    pub name: String,
    pub species_id: i64,
    pub scientist_id: Option<i64>,
    pub description: Option<String>,
    pub slack_channel_url: Option<String>,
    pub deleted: bool,
    pub created_at: OffsetDateTime,
}

/// Experiment joined with its species and scientist.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ExperimentDetailRow {
    pub id: i64,
    pub name: String,
    pub species_id: i64,
    pub species_common_name: String,
    pub description: Option<String>,
    pub slack_channel_url: Option<String>,
    pub scientist_name: Option<String>,
    pub scientist_email: Option<String>,
}

/// One plant of an experiment with its wave and accession.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ExperimentPlantRow {
    pub plant_id: i64,
    pub qr_code: Option<String>,
    pub wave_id: i64,
    pub wave_number: Option<i64>,
    pub wave_name: Option<String>,
    pub accession_id: Option<i64>,
    pub accession_name: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PlantRow {
    pub id: i64,
    pub wave_id: Option<i64>,
    pub accession_id: Option<i64>,
    pub qr_code: Option<String>,
    pub germ_day: Option<i64>,
    pub germ_day_color: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ScanRow {
    pub id: i64,
    pub plant_id: i64,
    pub scanner_id: Option<i64>,
    pub plant_age_days: Option<i64>,
    pub date_scanned: Option<Date>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ImageRow {
    pub id: i64,
    pub scan_id: i64,
    pub frame_number: i64,
    pub object_path: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanWithImages {
    pub scan: ScanRow,
    pub images: Vec<ImageRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlantWithScans {
    pub plant: PlantRow,
    pub scans: Vec<ScanWithImages>,
}

/// Group flat plant/scan/image rows into a tree. Scans are ordered by plant age.
pub fn assemble_plants(
    plants: Vec<PlantRow>,
    scans: Vec<ScanRow>,
    images: Vec<ImageRow>,
) -> Vec<PlantWithScans> {
    let mut images_by_scan: HashMap<i64, Vec<ImageRow>> = HashMap::new();
    for image in images {
        images_by_scan.entry(image.scan_id).or_default().push(image);
    }

    let mut scans_by_plant: HashMap<i64, Vec<ScanWithImages>> = HashMap::new();
    for scan in scans {
        let mut images = images_by_scan.remove(&scan.id).unwrap_or_default();
        images.sort_by_key(|i| i.frame_number);
        scans_by_plant
            .entry(scan.plant_id)
            .or_default()
            .push(ScanWithImages { scan, images });
    }

    plants
        .into_iter()
        .map(|plant| {
            let mut scans = scans_by_plant.remove(&plant.id).unwrap_or_default();
            scans.sort_by_key(|s| s.scan.plant_age_days.unwrap_or(0));
            PlantWithScans { plant, scans }
        })
        .collect()
}

/// A scan with the plant, accession and wave it belongs to.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ScanContextRow {
    pub scan_id: i64,
    pub plant_id: i64,
    pub plant_age_days: Option<i64>,
    pub date_scanned: Option<Date>,
    pub qr_code: Option<String>,
    pub accession_name: Option<String>,
    pub wave_number: Option<i64>,
    pub experiment_id: i64,
    pub scanner_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanDetail {
    pub context: ScanContextRow,
    pub images: Vec<ImageRow>,
}

/// An image with its scan and plant.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ImageContextRow {
    pub image_id: i64,
    pub object_path: Option<String>,
    pub frame_number: i64,
    pub scan_id: i64,
    pub plant_age_days: Option<i64>,
    pub date_scanned: Option<Date>,
    pub qr_code: Option<String>,
}

/// Row of the `cyl_wave_timeline` view.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WaveTimelineRow {
    pub date_scanned: Option<Date>,
    pub species_name: Option<String>,
    pub experiment_name: Option<String>,
    pub wave_number: Option<i64>,
    pub count: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TraitValueRow {
    pub trait_name: String,
    pub accession_name: String,
    pub value: f64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ScannerRow {
    pub id: i64,
    pub name: String,
}

/// Metadata for one scanner image as collected by the upload tools.
///
/// Every field is required; [`NewImageMetadata::validate`] names the first
/// missing one.
#[derive(Debug, Clone, Default)]
pub struct NewImageMetadata {
    pub species: Option<String>,
    pub experiment: Option<String>,
    pub wave_number: Option<i64>,
    pub germ_day: Option<i64>,
    pub germ_day_color: Option<String>,
    pub plant_age_days: Option<i64>,
    pub date_scanned: Option<Date>,
    pub device_name: Option<String>,
    pub plant_qr_code: Option<String>,
    pub accession_name: Option<String>,
    pub frame_number: Option<i64>,
    pub scientist_name: Option<String>,
    pub scientist_email: Option<String>,
    pub phenotyper_name: Option<String>,
    pub phenotyper_email: Option<String>,
}

/// [`NewImageMetadata`] with every field present.
#[derive(Debug, Clone)]
pub struct ImageMetadata {
    pub species: String,
    pub experiment: String,
    pub wave_number: i64,
    pub germ_day: i64,
    pub germ_day_color: String,
    pub plant_age_days: i64,
    pub date_scanned: Date,
    pub device_name: String,
    pub plant_qr_code: String,
    pub accession_name: String,
    pub frame_number: i64,
    pub scientist_name: String,
    pub scientist_email: String,
    pub phenotyper_name: String,
    pub phenotyper_email: String,
}

fn require<T: Clone>(value: &Option<T>, field: &str) -> StoreResult<T> {
    value
        .clone()
        .ok_or_else(|| StoreError::Validation(format!("missing {field}")))
}

impl NewImageMetadata {
    pub fn validate(&self) -> StoreResult<ImageMetadata> {
        Ok(ImageMetadata {
            species: require(&self.species, "species")?,
            experiment: require(&self.experiment, "experiment")?,
            wave_number: require(&self.wave_number, "wave_number")?,
            germ_day: require(&self.germ_day, "germ_day")?,
            germ_day_color: require(&self.germ_day_color, "germ_day_color")?,
            plant_age_days: require(&self.plant_age_days, "plant_age_days")?,
            date_scanned: require(&self.date_scanned, "date_scanned")?,
            device_name: require(&self.device_name, "device_name")?,
            plant_qr_code: require(&self.plant_qr_code, "plant_qr_code")?,
            accession_name: require(&self.accession_name, "accession_name")?,
            frame_number: require(&self.frame_number, "frame_number")?,
            scientist_name: require(&self.scientist_name, "scientist_name")?,
            scientist_email: require(&self.scientist_email, "scientist_email")?,
            phenotyper_name: require(&self.phenotyper_name, "phenotyper_name")?,
            phenotyper_email: require(&self.phenotyper_email, "phenotyper_email")?,
        })
    }
}

impl ImageMetadata {
    /// Split "First Last" into (first, last) for the phenotypers table.
    pub fn phenotyper_first_last(&self) -> (String, String) {
        match self.phenotyper_name.trim().split_once(' ') {
            Some((first, last)) => (first.to_string(), last.trim().to_string()),
            None => (self.phenotyper_name.trim().to_string(), String::new()),
        }
    }
}

/// Status of an image row before its file is uploaded.
pub const IMAGE_STATUS_PENDING: &str = "PENDING";

/// Status of an image row once its file is in object storage.
pub const IMAGE_STATUS_SUCCESS: &str = "SUCCESS";

// =============================================================================
// Genes and translation
// =============================================================================

/// Gene candidate joined with its scientist and gene annotation.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GeneCandidateRow {
    pub gene: String,
    pub category: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<OffsetDateTime>,
    pub evidence_description: Option<String>,
    pub disclosed_to_otd: Option<bool>,
    pub publication_status: Option<String>,
    pub translation_approval_date: Option<Date>,
    pub scientist_name: Option<String>,
    pub scientist_email: Option<String>,
    pub standard_name: Option<String>,
    pub symbol: Option<String>,
    pub short_description: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TranslationProjectRow {
    pub id: i64,
    pub name: String,
    pub spreadsheet_url: Option<String>,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Single-cell RNA expression
// =============================================================================

/// Dataset joined with its species and scientist.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DatasetRow {
    pub id: i64,
    pub name: String,
    pub species_id: i64,
    pub species_common_name: Option<String>,
    pub scientist_name: Option<String>,
    pub scientist_email: Option<String>,
    pub assembly: Option<String>,
    pub annotation: Option<String>,
    pub strain: Option<String>,
    pub url: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct NewDataset {
    pub name: String,
    pub species_id: i64,
    pub scientist_id: Option<i64>,
    pub url: Option<String>,
    pub assembly: Option<String>,
    pub annotation: Option<String>,
    pub strain: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ScrnaGeneRow {
    pub id: i64,
    pub dataset_id: i64,
    pub gene_name: String,
    pub gene_number: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ScrnaCellRow {
    pub id: i64,
    pub dataset_id: i64,
    pub cell_number: i64,
    pub barcode: String,
    pub x: f64,
    pub y: f64,
    pub cluster_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewCell {
    pub barcode: String,
    pub x: f64,
    pub y: f64,
    pub cluster_id: Option<String>,
}

// =============================================================================
// OAuth flow state and tokens
// =============================================================================

/// A pending PKCE authorization attempt. At most one per (user, provider).
#[derive(Debug, Clone, FromRow)]
pub struct FlowStateRow {
    pub id: i64,
    pub user_id: String,
    pub provider: String,
    pub state: String,
    pub code_verifier: String,
    pub code_challenge: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewFlowState {
    pub user_id: String,
    pub provider: String,
    pub state: String,
    pub code_verifier: String,
    pub code_challenge: String,
    pub created_at: OffsetDateTime,
}

/// Encrypted provider credentials. At most one per (user, provider).
#[derive(Debug, Clone, FromRow)]
pub struct OAuthTokensRow {
    pub id: i64,
    pub user_id: String,
    pub provider: String,
    pub encrypted_access_token: String,
    pub encrypted_refresh_token: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewOAuthTokens {
    pub user_id: String,
    pub provider: String,
    pub encrypted_access_token: String,
    pub encrypted_refresh_token: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}
