// PromptFlow Runtime - Flow execution
//
// Graph executor with pluggable node handlers, the flow service that adds
// storage, cancellation and timeouts, and the batch prompt runner.

pub mod batch;
pub mod executor;
pub mod service;
pub mod store;

pub use batch::{BatchExecutor, BatchItem};
pub use executor::{
    evaluate_condition, FlowEvent, FlowExecutor, HandlerRegistry, NodeHandler, NodeOutcome,
};
pub use service::FlowService;
pub use store::{FlowStore, InMemoryFlowStore};

// Re-export for handler implementors
pub use tokio_util::sync::CancellationToken;
