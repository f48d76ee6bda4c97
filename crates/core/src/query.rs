//! Contract of the consumed query interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::records::Record;

/// Name of the page parameter the pagination driver injects into [`QueryParams`].
pub const PAGE_PARAM: &str = "page";

/// Filter parameters of a collection query.
///
/// Kept sorted so that two parameter sets with the same entries produce the same
/// fingerprint regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParams(BTreeMap<String, Value>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Same parameters with the page number set.
    pub fn for_page(&self, page: u32) -> Self {
        self.clone().with(PAGE_PARAM, page)
    }

    /// Stable identity of the filter, ignoring the page parameter.
    pub fn fingerprint(&self) -> String {
        let filters = self
            .0
            .iter()
            .filter(|(name, _)| name.as_str() != PAGE_PARAM)
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>();
        filters.join("&")
    }
}

/// Snapshot returned by the query interface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySnapshot {
    pub data: Option<Vec<Record>>,
    pub is_loading: bool,
    pub is_fetching: bool,
    pub is_success: bool,
    pub is_error: bool,
    pub error: Option<String>,
}

impl QuerySnapshot {
    pub fn success(data: Vec<Record>) -> Self {
        Self {
            data: Some(data),
            is_success: true,
            ..Self::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn loading() -> Self {
        Self {
            is_loading: true,
            is_fetching: true,
            ..Self::default()
        }
    }
}

/// Returns the current server view of a named collection.
///
/// Same `query_key` and `params` must return data consistent with the server's current
/// state; different `params` denote a different logical collection.
#[async_trait]
pub trait QueryInterface: Send + Sync {
    async fn fetch(&self, query_key: &str, params: &QueryParams) -> QuerySnapshot;
}
