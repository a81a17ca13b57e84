//! Scanner repository.

use crate::error::StoreResult;
use crate::models::ScannerRow;
use async_trait::async_trait;

#[async_trait]
pub trait ScannerRepo: Send + Sync {
    /// List scanners ordered by name.
    async fn list_scanners(&self) -> StoreResult<Vec<ScannerRow>>;

    /// Add a scanner. Fails with `AlreadyExists` for a duplicate name.
    async fn add_scanner(&self, name: &str) -> StoreResult<i64>;

    /// Delete a scanner by name. Fails with `NotFound` when absent.
    async fn delete_scanner(&self, name: &str) -> StoreResult<()>;
}
