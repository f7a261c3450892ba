//! Tool-call handling: handler trait, argument access, registry, stock lookup.

pub mod arguments;
pub mod registry;
pub mod stock;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use registry::ToolRegistry;
pub use stock::{normalize_product_key, MemoryStockStore, StockLookupTool, StockRecord, StockStore};
pub use tool::{FnTool, Tool, ToolCallContext};
pub use types::{ToolDefinition, ToolParameters};
