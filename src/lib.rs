//! Batch-drive several LLM HTTP APIs with one set of prompts, normalising
//! request and response shapes and recording token usage and cost per call.

pub mod api;
pub mod batch;
pub mod client;
pub mod conversation;
pub mod cost;
pub mod error;
pub mod extract;
pub mod logging;
pub mod providers;
pub mod registry;
pub mod report;
pub mod usage;

pub use api::{ChatMessage, Role};
pub use batch::{BatchRunner, BatchSummary, DEFAULT_DELAY};
pub use client::{HttpTransport, RawResponse, Transport};
pub use conversation::ConversationHistory;
pub use cost::{CallCost, CostTable, CostTotal};
pub use error::{Error, Result};
pub use extract::{FieldPath, ResponseExtractor};
pub use logging::LogConfig;
pub use providers::ProviderFamily;
pub use registry::{Provider, ProviderConfig, ProviderRegistry};
pub use report::CallResult;
pub use usage::{TokenUsage, UsageMetrics};
