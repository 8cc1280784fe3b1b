//! Guild projection

use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// Guild (server) projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: Snowflake,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    pub owner_id: Snowflake,
}

impl Guild {
    pub fn new(id: Snowflake, name: impl Into<String>, owner_id: Snowflake) -> Self {
        Self {
            id,
            name: name.into(),
            icon: None,
            owner_id,
        }
    }
}
