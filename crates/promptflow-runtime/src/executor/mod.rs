//! Flow executor module - Core execution logic

pub mod flow_executor;
pub mod handlers;

pub use flow_executor::{FlowEvent, FlowExecutor};
pub use handlers::{
    evaluate_condition, ConditionalHandler, HandlerRegistry, NodeHandler, NodeOutcome,
    NotImplementedHandler, OutputHandler, PromptHandler, VariableHandler,
};
