//! Output graph store
//!
//! The digital twin store ingestion writes into. Only the calls reconciliation
//! needs are modelled; transport, retries and authentication belong to the
//! implementation.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::merge::PatchDocument;
use crate::value_objects::{Relationship, Twin};

/// Errors returned by the twin store and the mapping store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Filter for a twin query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TwinQuery {
    /// Twins whose `externalID` content equals the value
    ExternalId(String),
}

impl TwinQuery {
    /// Store-side filter expression
    pub fn filter(&self) -> String {
        match self {
            Self::ExternalId(id) => format!("externalID = '{}'", id.replace('\'', "\\'")),
        }
    }

    /// Whether a twin satisfies the filter
    pub fn matches(&self, twin: &Twin) -> bool {
        match self {
            Self::ExternalId(id) => twin.content_string("externalID").as_deref() == Some(id.as_str()),
        }
    }
}

/// One page of query results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TwinPage {
    pub twins: Vec<Twin>,
    pub continuation_token: Option<String>,
}

/// Digital twin store
#[async_trait]
pub trait TwinStore: Send + Sync {
    /// Fetch the twins that exist among `ids`; missing ids are left out
    async fn get_twins_by_ids(&self, ids: &[String]) -> StoreResult<Vec<Twin>>;

    async fn get_twin_by_id(&self, twin_id: &str) -> StoreResult<Option<Twin>>;

    async fn query_twins(
        &self,
        query: &TwinQuery,
        continuation_token: Option<&str>,
    ) -> StoreResult<TwinPage>;

    /// Create or replace a whole twin
    async fn update_twin(&self, twin: &Twin) -> StoreResult<()>;

    async fn patch_twin(&self, twin_id: &str, patch: &PatchDocument) -> StoreResult<()>;

    /// Delete twins together with every relationship touching them
    async fn delete_twins_and_relationships(&self, twin_ids: &[String]) -> StoreResult<()>;

    async fn get_relationship(
        &self,
        source_id: &str,
        relationship_id: &str,
    ) -> StoreResult<Option<Relationship>>;

    async fn upsert_relationship(&self, relationship: &Relationship) -> StoreResult<()>;

    /// Every model document known to the store
    async fn get_models(&self) -> StoreResult<Vec<Value>>;
}

/// Run a twin query to completion, following continuation tokens
pub async fn query_all_twins(store: &dyn TwinStore, query: &TwinQuery) -> StoreResult<Vec<Twin>> {
    let mut page = store.query_twins(query, None).await?;
    let mut twins = std::mem::take(&mut page.twins);

    while let Some(token) = page.continuation_token.take() {
        page = store.query_twins(query, Some(&token)).await?;
        twins.append(&mut page.twins);
    }

    Ok(twins)
}
