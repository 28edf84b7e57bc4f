use log::warn;

use crate::model::Objective;

/// Step counters of the three sub-objectives, plus the amount of buffer pushes.
///
/// Every counter only moves forward: a model reporting a step below the last one seen is
/// ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingState {
    refiner_step: u64,
    discrim_step: u64,
    learner_step: u64,
    pushes: u64,
}

impl TrainingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last step reported for `objective`.
    pub fn step(&self, objective: Objective) -> u64 {
        match objective {
            Objective::Refiner => self.refiner_step,
            Objective::Discriminator => self.discrim_step,
            Objective::Learner => self.learner_step,
        }
    }

    /// Records the step count a model returned for `objective`.
    ///
    /// # Returns
    /// The counter after the update.
    pub fn record(&mut self, objective: Objective, step: u64) -> u64 {
        let counter = match objective {
            Objective::Refiner => &mut self.refiner_step,
            Objective::Discriminator => &mut self.discrim_step,
            Objective::Learner => &mut self.learner_step,
        };

        if step < *counter {
            warn!("{objective} step went back from {counter} to {step}, keeping {counter}");
        } else {
            *counter = step;
        }

        *counter
    }

    pub fn record_push(&mut self) {
        self.pushes += 1;
    }

    pub fn pushes(&self) -> u64 {
        self.pushes
    }
}
