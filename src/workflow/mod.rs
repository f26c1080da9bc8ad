pub mod candidate_ctx;
pub mod recognize_flow;

pub use candidate_ctx::CandidateCtx;
pub use recognize_flow::{FlowResult, RecognizeFlow};
