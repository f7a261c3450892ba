//! Inventory lookup tool and the stock store it reads from.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolCallContext};
use super::types::ToolParameters;
use crate::error::VoxError;

/// Function name used when configuration does not override it.
pub const DEFAULT_STOCK_TOOL_NAME: &str = "get_stock_info";

/// One inventory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub product_key: String,
    pub quantity: i64,
}

/// Read-only inventory collaborator, keyed by normalized product key.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Quantity for a normalized key, `None` when the product is unknown.
    async fn quantity(&self, product_key: &str) -> Result<Option<i64>, VoxError>;
}

/// Normalize a spoken product name into a store key.
///
/// Trims, lowercases and collapses inner whitespace, so "  Whole   MILK "
/// and "whole milk" hit the same record.
pub fn normalize_product_key(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// In-memory stock store.
#[derive(Debug, Default)]
pub struct MemoryStockStore {
    records: RwLock<HashMap<String, i64>>,
}

impl MemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = StockRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|r| (normalize_product_key(&r.product_key), r.quantity))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Load a JSON object of `{"product name": quantity}` pairs.
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, VoxError> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let entries: HashMap<String, i64> = serde_json::from_str(&raw)?;
        Ok(Self::from_records(entries.into_iter().map(
            |(product_key, quantity)| StockRecord {
                product_key,
                quantity,
            },
        )))
    }

    pub async fn set(&self, product: &str, quantity: i64) {
        self.records
            .write()
            .await
            .insert(normalize_product_key(product), quantity);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl StockStore for MemoryStockStore {
    async fn quantity(&self, product_key: &str) -> Result<Option<i64>, VoxError> {
        Ok(self.records.read().await.get(product_key).copied())
    }
}

#[derive(Debug, Deserialize)]
struct StockQueryArgs {
    product_name: String,
}

/// Answers `product_name` stock questions from a [`StockStore`].
pub struct StockLookupTool {
    name: String,
    parameters: ToolParameters,
    store: Arc<dyn StockStore>,
}

impl StockLookupTool {
    pub fn new(store: Arc<dyn StockStore>) -> Self {
        Self {
            name: DEFAULT_STOCK_TOOL_NAME.to_string(),
            parameters: ToolParameters::object()
                .string("product_name", "Name of the product whose stock is queried", true)
                .build(),
            store,
        }
    }

    /// Override the function name the assistant is configured to call.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Tool for StockLookupTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Looks up how many units of a product are in stock"
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        _ctx: &ToolCallContext,
    ) -> Result<serde_json::Value, VoxError> {
        let query: StockQueryArgs = args.deserialize()?;
        let key = normalize_product_key(&query.product_name);
        if key.is_empty() {
            return Err(VoxError::InvalidArgument(
                "product_name cannot be empty".to_string(),
            ));
        }

        let result = match self.store.quantity(&key).await? {
            Some(quantity) => serde_json::json!({
                "product": key,
                "quantity": quantity,
                "in_stock": quantity > 0,
            }),
            None => serde_json::json!({
                "product": key,
                "found": false,
            }),
        };
        Ok(result)
    }
}

impl std::fmt::Debug for StockLookupTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StockLookupTool")
            .field("name", &self.name)
            .finish()
    }
}
