//! OAuth flow state and token repository.

use crate::error::StoreResult;
use crate::models::{FlowStateRow, NewFlowState, NewOAuthTokens, OAuthTokensRow};
use async_trait::async_trait;

/// Replace-semantics storage for PKCE flow state and provider tokens.
///
/// Both tables hold at most one row per (user, provider): every write deletes
/// the previous rows for that key in the same transaction.
#[async_trait]
pub trait OAuthRepo: Send + Sync {
    /// Delete pending flows for (user, provider) and insert this one.
    async fn replace_flow_state(&self, flow: &NewFlowState) -> StoreResult<()>;

    /// Look up a pending flow by (user, provider, state).
    async fn get_flow_state(
        &self,
        user_id: &str,
        provider: &str,
        state: &str,
    ) -> StoreResult<Option<FlowStateRow>>;

    /// Count pending flows for (user, provider).
    async fn count_flow_states(&self, user_id: &str, provider: &str) -> StoreResult<u64>;

    /// Delete stored tokens for (user, provider) and insert these.
    async fn replace_tokens(&self, tokens: &NewOAuthTokens) -> StoreResult<()>;

    /// Get stored tokens for (user, provider).
    async fn get_tokens(&self, user_id: &str, provider: &str)
    -> StoreResult<Option<OAuthTokensRow>>;
}
