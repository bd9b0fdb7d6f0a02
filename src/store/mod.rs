use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use utoipa::ToSchema;
use uuid::Uuid;

/// A stored return request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRecord {
    pub id: Uuid,
    pub order_id: String,
    pub created_at: DateTime<Utc>,
}

/// In-memory return request storage. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct ReturnStore {
    records: RwLock<HashMap<Uuid, ReturnRecord>>,
}

impl ReturnStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a return for `order_id` under a fresh id.
    pub async fn insert(&self, order_id: String) -> ReturnRecord {
        let record = ReturnRecord {
            id: Uuid::new_v4(),
            order_id,
            created_at: Utc::now(),
        };

        self.records.write().await.insert(record.id, record.clone());
        record
    }

    pub async fn get(&self, id: &Uuid) -> Option<ReturnRecord> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
