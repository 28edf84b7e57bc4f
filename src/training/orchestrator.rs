use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use super::{diagnostics, Schedule, TestSamples, TrainingState};
use crate::{
    buffer::HistoryBuffer,
    config::TrainerConfig,
    context::{JobName, TrainingContext},
    data::DataLoader,
    error::{Result, TrainErr},
    model::{DiscrimFeed, LearnerFeed, Model, Objective, RefinerFeed, SnapshotGroup, StepResult},
    summary::SummarySink,
};

/// Drives the refiner, discriminator and learner of a `Model` through the training schedule,
/// cycling refiner outputs through a `HistoryBuffer`.
pub struct TrainingOrchestrator<M, D, S>
where
    M: Model,
    D: DataLoader,
    S: SummarySink,
{
    ctx: TrainingContext,
    config: TrainerConfig,
    model: M,
    data_loader: D,
    history: HistoryBuffer,
    summaries: S,
    state: TrainingState,

    // Whether the next step is asked for a summary.
    summarize: bool,
    static_captured: bool,
}

impl<M, D, S> TrainingOrchestrator<M, D, S>
where
    M: Model,
    D: DataLoader,
    S: SummarySink,
{
    /// Creates a new `TrainingOrchestrator`.
    ///
    /// # Arguments
    /// * `ctx` - Where this run executes, along with its random number generator.
    /// * `config` - The trainer configuration.
    /// * `model` - The model to train.
    /// * `data_loader` - The source of real batches and synthetic test samples.
    /// * `summaries` - Receives every summary the model reports.
    ///
    /// # Returns
    /// An error if `config` is invalid or `ctx` belongs to a parameter server.
    pub fn new(
        ctx: TrainingContext,
        config: TrainerConfig,
        model: M,
        data_loader: D,
        summaries: S,
    ) -> Result<Self> {
        config.validate()?;

        if ctx.job == JobName::ParameterServer {
            return Err(TrainErr::InvalidConfig(format!(
                "{} task {} is a parameter server and can't drive training",
                ctx.job, ctx.task_index
            )));
        }

        let history = HistoryBuffer::new(config.buffer_size, config.buffer_replacement);

        Ok(Self {
            ctx,
            config,
            model,
            data_loader,
            history,
            summaries,
            state: TrainingState::new(),
            summarize: false,
            static_captured: false,
        })
    }

    /// Runs the whole schedule. Any failing step aborts the run.
    ///
    /// # Returns
    /// The step counters reached.
    pub fn train(&mut self) -> Result<TrainingState> {
        info!(
            "training starts on {} (chief: {})",
            self.ctx.worker_device(),
            self.ctx.is_chief()
        );

        let crop = (self.config.input_height, self.config.input_width);
        let samples = TestSamples::draw(
            &self.data_loader,
            &mut self.ctx.rng,
            self.config.sample_num(),
            crop,
        )?;

        let schedule = Schedule::from_config(&self.config);
        for phase in schedule.phases() {
            info!("{}: {} iterations", phase.name, phase.outer);
            let pb = phase_progress(phase.name, phase.outer);

            for k in 0..phase.outer {
                for step in &phase.steps {
                    for _ in 0..step.repeat {
                        match step.objective {
                            Objective::Refiner => {
                                self.train_refiner(step.push.pushes(k), &samples)?
                            }
                            Objective::Discriminator => self.train_discrim()?,
                            Objective::Learner => self.train_learner()?,
                        };
                    }
                }
                pb.inc(1);
            }
            pb.finish();
        }

        info!(
            "training done after {} buffer pushes, {} entries kept",
            self.state.pushes(),
            self.history.len()
        );

        Ok(self.state)
    }

    /// Runs one refiner step, optionally pushing its output into the history buffer, and
    /// captures diagnostics every `log_step` steps.
    ///
    /// # Returns
    /// The refiner step reached.
    pub fn train_refiner(&mut self, push: bool, samples: &TestSamples) -> Result<u64> {
        let feed = RefinerFeed {
            synthetic_batch_size: self.data_loader.batch_size(),
            with_output: push,
        };

        let mut res = self
            .model
            .train_refiner(&feed, self.summarize)
            .map_err(|e| TrainErr::model(Objective::Refiner, e))?;
        let step = self.finish_step(Objective::Refiner, &res)?;

        if push {
            let output = res.output.take().ok_or_else(|| {
                TrainErr::model(Objective::Refiner, "no output returned for a push".into())
            })?;
            self.history.push(&mut self.ctx.rng, &output);
            self.state.record_push();
        }

        if step % self.config.log_step == 0 {
            self.capture_diagnostics(step, samples)?;
        }

        Ok(step)
    }

    /// Runs one discriminator step on replayed refiner outputs and a fresh real batch.
    pub fn train_discrim(&mut self) -> Result<u64> {
        let n = self.config.history_batch_size();
        let history = self.history.sample(&mut self.ctx.rng, n)?;
        let real = self.data_loader.next_batch()?;

        let feed = DiscrimFeed {
            synthetic_batch_size: n,
            refined_history: history.refined.view(),
            reference_history: history.references.view(),
            real_images: real.images.view(),
            real_masks: real.masks.view(),
        };

        let res = self
            .model
            .train_discrim(&feed, self.summarize)
            .map_err(|e| TrainErr::model(Objective::Discriminator, e))?;

        self.finish_step(Objective::Discriminator, &res)
    }

    /// Runs one learner step on replayed refined images and their masks.
    pub fn train_learner(&mut self) -> Result<u64> {
        let n = self.config.history_batch_size();
        let history = self.history.sample(&mut self.ctx.rng, n)?;

        let feed = LearnerFeed {
            synthetic_batch_size: n,
            refined_history: history.refined.view(),
            mask_history: history.masks.view(),
        };

        let res = self
            .model
            .train_learner(&feed, self.summarize)
            .map_err(|e| TrainErr::model(Objective::Learner, e))?;

        self.finish_step(Objective::Learner, &res)
    }

    fn finish_step(&mut self, objective: Objective, res: &StepResult) -> Result<u64> {
        let step = self.state.record(objective, res.step);
        debug!("{objective} step {step}");

        if let Some(summary) = &res.summary {
            self.summaries.add_summary(summary, step)?;
        }

        self.summarize = step % self.config.log_step == 0;
        Ok(step)
    }

    fn capture_diagnostics(&mut self, step: u64, samples: &TestSamples) -> Result<()> {
        let groups = [
            SnapshotGroup::RefinedImages,
            SnapshotGroup::LearnerOutputs,
            SnapshotGroup::SyntheticImages,
            SnapshotGroup::ReferImages,
        ];

        for group in groups {
            if group.is_static() && self.static_captured {
                continue;
            }
            self.inject_snapshot(group, samples, step)?;
        }

        self.static_captured = true;
        Ok(())
    }

    /// Runs the forward pass behind `group` on the test samples, records its summary and
    /// writes the tiled batch under the sample directory.
    ///
    /// # Returns
    /// The path of the written image.
    pub fn inject_snapshot(
        &mut self,
        group: SnapshotGroup,
        samples: &TestSamples,
        step: u64,
    ) -> Result<PathBuf> {
        let snapshot = self
            .model
            .snapshot(group, &samples.feed())
            .map_err(|e| TrainErr::model(group.objective(), e))?;

        self.summaries.add_summary(&snapshot.summary, step)?;

        let path = diagnostics::write_snapshot(
            &self.ctx.sample_dir,
            group.tag(),
            step,
            snapshot.output.view(),
            self.config.sample_grid(),
        )?;

        info!("wrote {}", path.display());
        Ok(path)
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn summaries(&self) -> &S {
        &self.summaries
    }

    pub fn context(&self) -> &TrainingContext {
        &self.ctx
    }
}

/// A bar counting the outer iterations of a schedule phase.
fn phase_progress(name: &'static str, outer: usize) -> ProgressBar {
    let style = ProgressStyle::with_template("{msg} [{elapsed_precise}] [{wide_bar}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");

    let pb = ProgressBar::new(outer as u64);
    pb.set_style(style);
    pb.set_message(name);
    pb
}
