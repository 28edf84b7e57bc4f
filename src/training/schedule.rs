use crate::{config::TrainerConfig, model::Objective};

/// When a refiner step hands its output to the history buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushPolicy {
    Never,
    Always,
    /// Only during the last tenth of a `total`-iteration phase.
    FinalTenth { total: usize },
}

impl PushPolicy {
    /// Whether the step run on outer iteration `k` pushes.
    pub fn pushes(self, k: usize) -> bool {
        match self {
            PushPolicy::Never => false,
            PushPolicy::Always => true,
            PushPolicy::FinalTenth { total } => k >= total * 9 / 10,
        }
    }
}

/// One sub-objective run `repeat` times in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseStep {
    pub objective: Objective,
    pub repeat: usize,
    pub push: PushPolicy,
}

impl PhaseStep {
    fn new(objective: Objective, repeat: usize) -> Self {
        Self {
            objective,
            repeat,
            push: PushPolicy::Never,
        }
    }

    fn pushing(mut self, push: PushPolicy) -> Self {
        self.push = push;
        self
    }
}

/// A loop of `outer` iterations, each running `steps` in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub name: &'static str,
    pub outer: usize,
    pub steps: Vec<PhaseStep>,
}

impl Phase {
    fn new(name: &'static str, outer: usize, steps: Vec<PhaseStep>) -> Self {
        Self { name, outer, steps }
    }

    /// The amount of buffer pushes the whole phase performs.
    fn pushes(&self) -> usize {
        self.steps
            .iter()
            .map(|step| {
                let pushing = (0..self.outer).filter(|&k| step.push.pushes(k)).count();
                pushing * step.repeat
            })
            .sum()
    }
}

/// How many steps of every kind a schedule performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepTotals {
    pub refiner: usize,
    pub discriminator: usize,
    pub learner: usize,
    pub pushes: usize,
}

/// The training curriculum, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    phases: Vec<Phase>,
}

impl Schedule {
    /// Builds the six training loops from the iteration counts of `config`:
    ///
    /// 1. refiner warm-up, pushing during its final tenth,
    /// 2. discriminator warm-up,
    /// 3. joint refiner and discriminator,
    /// 4. learner warm-up,
    /// 5. joint refiner, learner and discriminator,
    /// 6. learner cool-down.
    pub fn from_config(config: &TrainerConfig) -> Self {
        use Objective::*;

        let always = PushPolicy::Always;
        let phases = vec![
            Phase::new(
                "train refiner",
                config.initial_k_g,
                vec![PhaseStep::new(Refiner, 1).pushing(PushPolicy::FinalTenth {
                    total: config.initial_k_g,
                })],
            ),
            Phase::new(
                "train discrim",
                config.initial_k_d,
                vec![PhaseStep::new(Discriminator, 1)],
            ),
            Phase::new(
                "train refiner+discrim",
                config.max_step_d_g,
                vec![
                    PhaseStep::new(Refiner, config.k_g).pushing(always),
                    PhaseStep::new(Discriminator, config.k_d),
                ],
            ),
            Phase::new(
                "train learner",
                config.initial_k_l,
                vec![PhaseStep::new(Learner, 1)],
            ),
            Phase::new(
                "train all three",
                config.max_step_d_g_l,
                vec![
                    PhaseStep::new(Refiner, config.k_g).pushing(always),
                    PhaseStep::new(Learner, config.k_l),
                    PhaseStep::new(Discriminator, config.k_d),
                ],
            ),
            Phase::new(
                "train learner (cool-down)",
                config.after_k_l,
                vec![PhaseStep::new(Learner, 1)],
            ),
        ];

        Self { phases }
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn step_totals(&self) -> StepTotals {
        let mut totals = StepTotals::default();

        for phase in &self.phases {
            for step in &phase.steps {
                let n = phase.outer * step.repeat;
                match step.objective {
                    Objective::Refiner => totals.refiner += n,
                    Objective::Discriminator => totals.discriminator += n,
                    Objective::Learner => totals.learner += n,
                }
            }
            totals.pushes += phase.pushes();
        }

        totals
    }

    /// Finds the first step that would sample the history buffer before anything was pushed.
    ///
    /// # Returns
    /// The name of the offending phase and the objective of the step.
    pub fn first_unfed_consumer(&self) -> Option<(&'static str, Objective)> {
        let mut fed = false;

        for phase in self.phases.iter().filter(|p| p.outer > 0) {
            for step in phase.steps.iter().filter(|s| s.repeat > 0) {
                if step.objective.consumes_history() && !fed {
                    return Some((phase.name, step.objective));
                }
                fed |= step.push.pushes(0);
            }
            fed |= phase.pushes() > 0;
        }

        None
    }
}
