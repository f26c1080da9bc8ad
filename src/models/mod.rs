pub mod element;
pub mod events;
pub mod imaging;
pub mod mutation;

pub use element::{ElementDescriptor, ElementKind};
pub use events::{EventBus, PipelineEvent};
pub use imaging::{GrayBuffer, RecognitionResult, Tensor};
pub use mutation::{MutationBatch, MutationRecord, MutationTrigger};
