pub mod change_tracker;
pub mod classifier;
pub mod image_pipeline;
pub mod input_binder;
pub mod model_loader;
pub mod ocr_runtime;
pub mod recognition;

pub use change_tracker::ChangeTracker;
pub use classifier::ElementClassifier;
pub use image_pipeline::ImagePipeline;
pub use input_binder::InputBinder;
pub use model_loader::{ModelBundle, ModelLoader};
pub use ocr_runtime::{HttpOcrRuntime, OcrRuntime};
pub use recognition::RecognitionEngine;
