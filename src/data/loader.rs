use std::path::{Path, PathBuf};

use ndarray::{Array4, Axis};

use crate::error::{Result, TrainErr};

/// A batch of real images and their masks, NHWC raw pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct RealBatch {
    pub images: Array4<f32>,
    pub masks: Array4<f32>,
}

impl RealBatch {
    /// Creates a new `RealBatch`.
    ///
    /// # Returns
    /// An error if images and masks don't hold the same amount of items.
    pub fn new(images: Array4<f32>, masks: Array4<f32>) -> Result<Self> {
        let (got, expected) = (masks.len_of(Axis(0)), images.len_of(Axis(0)));
        if got != expected {
            return Err(TrainErr::ShapeMismatch {
                what: "real masks",
                got,
                expected,
            });
        }

        Ok(Self { images, masks })
    }

    pub fn len(&self) -> usize {
        self.images.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Source of training data for the orchestrator.
pub trait DataLoader {
    /// The amount of samples in every batch.
    fn batch_size(&self) -> usize;

    /// Returns a fresh batch of real images and masks.
    fn next_batch(&mut self) -> Result<RealBatch>;

    /// Every synthetic image available, used to build held-out diagnostic samples.
    fn synthetic_data_paths(&self) -> &[PathBuf];

    /// Where the reference image of a synthetic image lives.
    fn reference_path(&self, synthetic: &Path) -> PathBuf;
}

impl<T: DataLoader + ?Sized> DataLoader for Box<T> {
    fn batch_size(&self) -> usize {
        (**self).batch_size()
    }

    fn next_batch(&mut self) -> Result<RealBatch> {
        (**self).next_batch()
    }

    fn synthetic_data_paths(&self) -> &[PathBuf] {
        (**self).synthetic_data_paths()
    }

    fn reference_path(&self, synthetic: &Path) -> PathBuf {
        (**self).reference_path(synthetic)
    }
}
