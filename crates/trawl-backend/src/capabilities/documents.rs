//! Subscriptions and their documents (bills, statements).

use crate::error::{BackendError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    #[default]
    Other,
    Bill,
    Statement,
    Contract,
    Notice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub kind: DocumentType,
    /// File extension, e.g. `pdf`
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[async_trait]
pub trait CapDocument: Send {
    async fn iter_subscriptions(&mut self) -> Result<Vec<Subscription>>;

    async fn iter_documents(&mut self, subscription_id: &str) -> Result<Vec<Document>>;

    /// Document by id, looked up through every subscription.
    async fn get_document(&mut self, id: &str) -> Result<Document> {
        for subscription in self.iter_subscriptions().await? {
            if let Some(document) = self
                .iter_documents(&subscription.id)
                .await?
                .into_iter()
                .find(|d| d.id == id)
            {
                return Ok(document);
            }
        }
        Err(BackendError::not_found(id))
    }

    async fn download_document(&mut self, document: &Document) -> Result<Vec<u8>>;
}
