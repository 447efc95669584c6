//! Workflow execution pipeline
//!
//! Request validation and shape normalization, the bounded upstream call to
//! the n8n webhook, and normalization of its reply into the fixed result
//! view consumed by the console.

pub mod input;
pub mod n8n;
pub mod normalize;

pub use input::{CanonicalPayload, CustomerMessage, RawExecuteRequest, RequestShape};
pub use n8n::{N8nClient, WorkflowOutcome};
pub use normalize::normalize_workflow_result;
