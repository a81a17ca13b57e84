//! Gene candidate and translation repository.

use crate::error::StoreResult;
use crate::models::{GeneCandidateRow, PersonRow, TranslationProjectRow};
use async_trait::async_trait;

#[async_trait]
pub trait GeneRepo: Send + Sync {
    /// Gene candidates, newest first, then by category and gene.
    async fn list_gene_candidates(&self) -> StoreResult<Vec<GeneCandidateRow>>;

    /// Translation projects ordered by name.
    async fn list_translation_projects(&self) -> StoreResult<Vec<TranslationProjectRow>>;

    /// People ordered by name.
    async fn list_people(&self) -> StoreResult<Vec<PersonRow>>;
}
