use std::fmt::{self, Display};

use ndarray::{Array4, ArrayView4};

use crate::{buffer::ReplayBatch, error::BoxedErr, summary::Summary};

/// The result type `Model` implementations return.
pub type ModelResult<T> = std::result::Result<T, BoxedErr>;

/// The three trainable sub-objectives of the refiner/discriminator/learner model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Objective {
    Refiner,
    Discriminator,
    Learner,
}

impl Objective {
    /// Whether a step of this objective samples from the history buffer.
    pub fn consumes_history(self) -> bool {
        !matches!(self, Objective::Refiner)
    }
}

impl Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Objective::Refiner => "refiner",
            Objective::Discriminator => "discriminator",
            Objective::Learner => "learner",
        };

        f.write_str(s)
    }
}

/// Inputs of a refiner step. The synthetic batch itself comes from the model's own input
/// pipeline.
#[derive(Debug, Clone, Copy)]
pub struct RefinerFeed {
    pub synthetic_batch_size: usize,
    /// Whether the step must return the refined batch.
    pub with_output: bool,
}

/// Inputs of a discriminator step: replayed refiner outputs against a fresh real batch.
#[derive(Debug, Clone, Copy)]
pub struct DiscrimFeed<'a> {
    pub synthetic_batch_size: usize,
    pub refined_history: ArrayView4<'a, f32>,
    pub reference_history: ArrayView4<'a, f32>,
    pub real_images: ArrayView4<'a, f32>,
    pub real_masks: ArrayView4<'a, f32>,
}

/// Inputs of a learner step: replayed refined images with the masks they were generated from.
#[derive(Debug, Clone, Copy)]
pub struct LearnerFeed<'a> {
    pub synthetic_batch_size: usize,
    pub refined_history: ArrayView4<'a, f32>,
    pub mask_history: ArrayView4<'a, f32>,
}

/// What a training step hands back.
#[derive(Debug, Default)]
pub struct StepResult {
    /// The objective's step counter after the update.
    pub step: u64,
    /// The refined batch, only present for refiner steps asked `with_output`.
    pub output: Option<ReplayBatch>,
    /// Present when the step was asked to summarize.
    pub summary: Option<Summary>,
}

/// The image groups captured as training diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotGroup {
    SyntheticImages,
    RefinedImages,
    ReferImages,
    /// Learner predictions rendered as masks, in `[0, 255]`.
    LearnerOutputs,
}

impl SnapshotGroup {
    pub fn tag(self) -> &'static str {
        match self {
            SnapshotGroup::SyntheticImages => "test_synthetic_images",
            SnapshotGroup::RefinedImages => "test_refined_images",
            SnapshotGroup::ReferImages => "test_refer_images",
            SnapshotGroup::LearnerOutputs => "test_learner_outputs",
        }
    }

    /// The sub-network whose forward pass produces the group.
    pub fn objective(self) -> Objective {
        match self {
            SnapshotGroup::LearnerOutputs => Objective::Learner,
            _ => Objective::Refiner,
        }
    }

    /// Groups that don't change during training and are only captured once.
    pub fn is_static(self) -> bool {
        matches!(
            self,
            SnapshotGroup::SyntheticImages | SnapshotGroup::ReferImages
        )
    }
}

/// Held-out samples fed to a diagnostic forward pass.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotFeed<'a> {
    pub synthetic: ArrayView4<'a, f32>,
    pub reference: ArrayView4<'a, f32>,
}

/// A diagnostic forward pass: a visual summary and the batch it was made from.
#[derive(Debug)]
pub struct Snapshot {
    pub summary: Summary,
    /// NHWC pixels in `[0, 255]`.
    pub output: Array4<f32>,
}

/// Forward-only learner inference on image patches.
pub trait PatchPredictor {
    /// Predicts a per-pixel mask for every patch.
    ///
    /// # Arguments
    /// * `patches` - A `(n, ps, ps, channels)` batch of normalized patches.
    ///
    /// # Returns
    /// A `(n, ps, ps, 1)` batch of probabilities.
    fn test_learner_patch(&mut self, patches: ArrayView4<'_, f32>) -> ModelResult<Array4<f32>>;
}

/// The capability interface of the refiner/discriminator/learner model.
///
/// Every call is blocking and runs a single update (or forward pass) against the model's
/// current parameters. How gradients are computed, and where the parameters live, is up to the
/// implementation.
pub trait Model: PatchPredictor {
    fn train_refiner(&mut self, feed: &RefinerFeed, summarize: bool) -> ModelResult<StepResult>;

    fn train_discrim(&mut self, feed: &DiscrimFeed<'_>, summarize: bool)
        -> ModelResult<StepResult>;

    fn train_learner(&mut self, feed: &LearnerFeed<'_>, summarize: bool)
        -> ModelResult<StepResult>;

    /// Runs the forward pass behind one diagnostic image group.
    fn snapshot(&mut self, group: SnapshotGroup, feed: &SnapshotFeed<'_>)
        -> ModelResult<Snapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_refiner_feeds_the_buffer() {
        assert!(!Objective::Refiner.consumes_history());
        assert!(Objective::Discriminator.consumes_history());
        assert!(Objective::Learner.consumes_history());
    }

    #[test]
    fn static_groups() {
        assert!(SnapshotGroup::SyntheticImages.is_static());
        assert!(SnapshotGroup::ReferImages.is_static());
        assert!(!SnapshotGroup::RefinedImages.is_static());
        assert_eq!(SnapshotGroup::LearnerOutputs.tag(), "test_learner_outputs");
    }
}
