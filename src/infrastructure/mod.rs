pub mod js_executor;
pub mod mutation_source;
pub mod page_agent;

pub use js_executor::JsExecutor;
pub use mutation_source::{CdpMutationSource, MutationSource};
pub use page_agent::PageAgent;
