use ndarray::{stack, Array3, Array4, ArrayView3, Axis};
use rand::Rng;
use serde::Deserialize;

use crate::error::{Result, TrainErr};

/// A refined image together with the mask and reference image it was generated from.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayEntry {
    pub refined: Array3<f32>,
    pub mask: Array3<f32>,
    pub reference: Array3<f32>,
}

/// A batch of replay entries stacked along the first (batch) axis, NHWC.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayBatch {
    pub refined: Array4<f32>,
    pub masks: Array4<f32>,
    pub references: Array4<f32>,
}

impl ReplayBatch {
    /// Creates a new `ReplayBatch`.
    ///
    /// # Returns
    /// An error if the three tensors don't hold the same amount of items.
    pub fn new(refined: Array4<f32>, masks: Array4<f32>, references: Array4<f32>) -> Result<Self> {
        let expected = refined.len_of(Axis(0));

        for (what, got) in [
            ("masks", masks.len_of(Axis(0))),
            ("reference images", references.len_of(Axis(0))),
        ] {
            if got != expected {
                return Err(TrainErr::ShapeMismatch {
                    what,
                    got,
                    expected,
                });
            }
        }

        Ok(Self {
            refined,
            masks,
            references,
        })
    }

    pub fn len(&self) -> usize {
        self.refined.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits the batch back into owned entries.
    pub fn entries(&self) -> impl Iterator<Item = ReplayEntry> + '_ {
        self.refined
            .outer_iter()
            .zip(self.masks.outer_iter())
            .zip(self.references.outer_iter())
            .map(|((refined, mask), reference)| ReplayEntry {
                refined: refined.to_owned(),
                mask: mask.to_owned(),
                reference: reference.to_owned(),
            })
    }

    fn stack(entries: &[&ReplayEntry]) -> Result<Self> {
        Ok(Self {
            refined: stack_field(entries, |e| e.refined.view())?,
            masks: stack_field(entries, |e| e.mask.view())?,
            references: stack_field(entries, |e| e.reference.view())?,
        })
    }
}

fn stack_field<F>(entries: &[&ReplayEntry], field: F) -> Result<Array4<f32>>
where
    F: for<'e> Fn(&'e ReplayEntry) -> ArrayView3<'e, f32>,
{
    let views: Vec<_> = entries.iter().map(|e| field(*e)).collect();
    Ok(stack(Axis(0), &views)?)
}

/// What happens to a push once the buffer is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementPolicy {
    /// Overwrite an occupied slot chosen uniformly at random.
    #[default]
    Random,
    /// Overwrite the oldest slot.
    Fifo,
}

/// Fixed-capacity store of past refiner outputs, replayed to the discriminator and learner.
///
/// Slots fill in order until the buffer is full; from then on every pushed entry replaces a
/// slot picked by the `ReplacementPolicy`. Sampling is uniform with replacement and never
/// changes the contents.
#[derive(Debug)]
pub struct HistoryBuffer {
    slots: Vec<ReplayEntry>,
    capacity: usize,
    policy: ReplacementPolicy,
    cursor: usize,
}

impl HistoryBuffer {
    /// Creates an empty `HistoryBuffer`.
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn new(capacity: usize, policy: ReplacementPolicy) -> Self {
        assert!(capacity > 0, "history buffer capacity must be > 0");

        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            policy,
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> ReplacementPolicy {
        self.policy
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReplayEntry> {
        self.slots.iter()
    }

    /// Inserts every entry of `batch`.
    ///
    /// # Arguments
    /// * `rng` - Picks the replaced slot once the buffer is full.
    /// * `batch` - The refiner outputs to store.
    pub fn push<R: Rng>(&mut self, rng: &mut R, batch: &ReplayBatch) {
        for entry in batch.entries() {
            self.push_entry(rng, entry);
        }
    }

    fn push_entry<R: Rng>(&mut self, rng: &mut R, entry: ReplayEntry) {
        if !self.is_full() {
            self.slots.push(entry);
            self.cursor = self.slots.len() % self.capacity;
            return;
        }

        let slot = match self.policy {
            ReplacementPolicy::Random => rng.random_range(0..self.slots.len()),
            ReplacementPolicy::Fifo => {
                let slot = self.cursor;
                self.cursor = (self.cursor + 1) % self.capacity;
                slot
            }
        };

        self.slots[slot] = entry;
    }

    /// Draws `n` entries uniformly at random, with replacement.
    ///
    /// # Returns
    /// The stacked entries, or `TrainErr::BufferEmpty` if nothing was pushed yet.
    pub fn sample<R: Rng>(&self, rng: &mut R, n: usize) -> Result<ReplayBatch> {
        if self.is_empty() {
            return Err(TrainErr::BufferEmpty);
        }

        let picked: Vec<_> = (0..n)
            .map(|_| &self.slots[rng.random_range(0..self.slots.len())])
            .collect();

        ReplayBatch::stack(&picked)
    }
}
