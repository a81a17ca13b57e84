//! Single-cell RNA expression repository.

use crate::error::StoreResult;
use crate::models::{
    DatasetRow, NewCell, NewDataset, ScrnaCellRow, ScrnaGeneRow, SpeciesSummaryRow,
};
use async_trait::async_trait;

#[async_trait]
pub trait ExpressionRepo: Send + Sync {
    /// Species having at least one dataset, with their dataset counts.
    async fn species_with_datasets(&self) -> StoreResult<Vec<SpeciesSummaryRow>>;

    /// Datasets of a species ordered by name.
    async fn list_datasets(&self, species_id: i64) -> StoreResult<Vec<DatasetRow>>;

    /// Get a dataset by id.
    async fn get_dataset(&self, id: i64) -> StoreResult<Option<DatasetRow>>;

    /// Create a dataset and return its id.
    async fn create_dataset(&self, dataset: &NewDataset) -> StoreResult<i64>;

    /// Insert genes numbered by their position in `names`.
    async fn insert_genes(&self, dataset_id: i64, names: &[String]) -> StoreResult<u64>;

    /// Insert cells numbered by their position in `cells`.
    async fn insert_cells(&self, dataset_id: i64, cells: &[NewCell]) -> StoreResult<u64>;

    /// Find a dataset gene by its number.
    async fn find_gene(&self, dataset_id: i64, gene_number: i64)
    -> StoreResult<Option<ScrnaGeneRow>>;

    /// Record where one gene's counts are stored.
    async fn insert_counts(
        &self,
        dataset_id: i64,
        gene_id: i64,
        counts_object_path: &str,
    ) -> StoreResult<i64>;

    /// Genes of a dataset ordered by number.
    async fn dataset_genes(&self, dataset_id: i64) -> StoreResult<Vec<ScrnaGeneRow>>;

    /// Cells of a dataset ordered by number.
    async fn dataset_cells(&self, dataset_id: i64) -> StoreResult<Vec<ScrnaCellRow>>;
}
