//! Species repository.

use crate::error::StoreResult;
use crate::models::{SpeciesRow, SpeciesSummaryRow};
use async_trait::async_trait;

/// Repository for species records.
#[async_trait]
pub trait SpeciesRepo: Send + Sync {
    /// Insert a species and return its id.
    async fn create_species(
        &self,
        common_name: &str,
        genus: Option<&str>,
        species: Option<&str>,
        illustration_path: &str,
    ) -> StoreResult<i64>;

    /// Set the illustration path of the species with this common name.
    async fn update_species_illustration(
        &self,
        common_name: &str,
        illustration_path: &str,
    ) -> StoreResult<()>;

    /// List all species ordered by common name.
    async fn list_species(&self) -> StoreResult<Vec<SpeciesRow>>;

    /// Get a species by id.
    async fn get_species(&self, id: i64) -> StoreResult<Option<SpeciesRow>>;

    /// Species having at least one non-deleted experiment, most experiments first.
    async fn list_species_with_experiments(&self) -> StoreResult<Vec<SpeciesSummaryRow>>;
}
