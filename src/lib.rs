//! Training orchestration and tiled inference for a refiner/discriminator/learner
//! segmentation model.
//!
//! The model itself stays behind the `Model` trait: this crate schedules its training steps,
//! replays refiner outputs through a `HistoryBuffer` and blends its patch predictions into
//! full-resolution masks.

pub mod buffer;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod imaging;
pub mod inference;
pub mod model;
pub mod summary;
pub mod training;

pub use buffer::{HistoryBuffer, ReplacementPolicy, ReplayBatch, ReplayEntry};
pub use config::TrainerConfig;
pub use context::TrainingContext;
pub use error::{Result, TrainErr};
pub use inference::InferenceEngine;
pub use model::{Model, Objective, PatchPredictor};
pub use training::{Schedule, TrainingOrchestrator};
