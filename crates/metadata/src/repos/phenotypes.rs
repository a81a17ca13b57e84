//! Cylinder phenotyping repository: experiments, plants, scans and images.

use crate::error::StoreResult;
use crate::models::{
    ExperimentDetailRow, ExperimentPlantRow, ExperimentRow, ImageContextRow, NewImageMetadata,
    PlantWithScans, ScanDetail, TraitValueRow, WaveTimelineRow,
};
use async_trait::async_trait;

#[async_trait]
pub trait PhenotypeRepo: Send + Sync {
    /// Non-deleted experiments of a species, ordered by name.
    async fn list_experiments(&self, species_id: i64) -> StoreResult<Vec<ExperimentRow>>;

    /// Names of the non-deleted experiments of a species.
    async fn experiment_names(&self, species_id: i64) -> StoreResult<Vec<String>>;

    /// All non-deleted experiments, ordered by species common name then name.
    async fn list_all_experiments(&self) -> StoreResult<Vec<ExperimentDetailRow>>;

    /// Get an experiment with its species and scientist.
    async fn get_experiment(&self, id: i64) -> StoreResult<Option<ExperimentDetailRow>>;

    /// Every plant of an experiment with its wave and accession.
    async fn experiment_plants(&self, experiment_id: i64) -> StoreResult<Vec<ExperimentPlantRow>>;

    /// Plants of one wave and accession, with their scans and first-frame images.
    async fn wave_accession_plants(
        &self,
        wave_id: i64,
        accession_id: i64,
    ) -> StoreResult<Vec<PlantWithScans>>;

    /// Plants of an experiment with the named accession, with scans and first-frame images.
    async fn accession_plants(
        &self,
        experiment_id: i64,
        accession_name: &str,
    ) -> StoreResult<Vec<PlantWithScans>>;

    /// Get a scan with its context and every image frame.
    async fn get_scan(&self, scan_id: i64) -> StoreResult<Option<ScanDetail>>;

    /// Get an image with its scan and plant.
    async fn get_image(&self, image_id: i64) -> StoreResult<Option<ImageContextRow>>;

    /// Scanned plant counts per day, species, experiment and wave.
    async fn wave_timeline(&self) -> StoreResult<Vec<WaveTimelineRow>>;

    /// Trait values of every scan in an experiment.
    async fn experiment_trait_values(&self, experiment_id: i64)
    -> StoreResult<Vec<TraitValueRow>>;

    /// Record one image, creating any missing species, people, experiment,
    /// wave, accession, plant, scanner and scan along the way. Returns the image id.
    async fn insert_image_metadata(&self, metadata: &NewImageMetadata) -> StoreResult<i64>;

    /// Set the object path and status of an image.
    async fn update_image(&self, image_id: i64, object_path: &str, status: &str)
    -> StoreResult<()>;
}
