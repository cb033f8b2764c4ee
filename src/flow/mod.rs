//! Question flow graphs — one ordered question list per visitor intent.

mod model;
mod provider;

pub use model::{Choice, Flow, Intent, Question};
pub use provider::{FlowProvider, StaticFlowProvider};
