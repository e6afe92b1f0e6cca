use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Account holder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[async_trait]
pub trait CapProfile: Send {
    async fn get_profile(&mut self) -> Result<Profile>;
}
