use std::{fs, path::Path, path::PathBuf};

use serde::Deserialize;

use crate::{
    buffer::ReplacementPolicy,
    data,
    error::{Result, TrainErr},
    training::Schedule,
};

/// Every option the trainer and the inference engine recognise.
///
/// Loaded from JSON. The upper-case phase names (`initial_K_g`, `K_d`, ...) are accepted as
/// aliases of the snake_case fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    // --- data ---
    pub data_set: String,
    pub data_dir: PathBuf,
    pub batch_size: usize,
    pub input_height: usize,
    pub input_width: usize,

    // --- outputs ---
    pub model_dir: PathBuf,
    #[serde(alias = "sample_model_dir")]
    pub sample_dir: PathBuf,
    pub load_path: Option<PathBuf>,
    pub checkpoint_secs: u64,
    pub max_image_summary: usize,
    pub sample_image_grid: Vec<usize>,
    pub log_step: u64,

    // --- history buffer ---
    pub buffer_size: usize,
    pub buffer_replacement: ReplacementPolicy,

    // --- schedule ---
    #[serde(alias = "initial_K_g")]
    pub initial_k_g: usize,
    #[serde(alias = "initial_K_d")]
    pub initial_k_d: usize,
    #[serde(alias = "initial_K_l")]
    pub initial_k_l: usize,
    #[serde(alias = "after_K_l")]
    pub after_k_l: usize,
    #[serde(alias = "K_g")]
    pub k_g: usize,
    #[serde(alias = "K_d")]
    pub k_d: usize,
    #[serde(alias = "K_l")]
    pub k_l: usize,
    pub max_step_d_g: usize,
    pub max_step_d_g_l: usize,

    // --- inference ---
    pub pred_step_size: usize,
    pub pred_gkern_sig: f64,
    pub pred_scaling: f64,

    // --- cluster ---
    pub ps_hosts: String,
    pub worker_hosts: String,
    pub job_name: String,
    pub task_index: usize,
    pub gpu: usize,
    pub gpu_memory_fraction: f64,

    pub seed: Option<u64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            data_set: data::NUCLEI.to_string(),
            data_dir: PathBuf::from("data"),
            batch_size: 64,
            input_height: 100,
            input_width: 100,

            model_dir: PathBuf::from("logs"),
            sample_dir: PathBuf::from("samples"),
            load_path: None,
            checkpoint_secs: 300,
            max_image_summary: 7,
            sample_image_grid: vec![10, 10],
            log_step: 500,

            buffer_size: 25600,
            buffer_replacement: ReplacementPolicy::Random,

            initial_k_g: 1000,
            initial_k_d: 200,
            initial_k_l: 1000,
            after_k_l: 1000,
            k_g: 2,
            k_d: 1,
            k_l: 1,
            max_step_d_g: 10000,
            max_step_d_g_l: 10000,

            pred_step_size: 50,
            pred_gkern_sig: 4.,
            pred_scaling: 1.,

            ps_hosts: "localhost:2222".to_string(),
            worker_hosts: "localhost:2223".to_string(),
            job_name: "worker".to_string(),
            task_index: 0,
            gpu: 0,
            gpu_memory_fraction: 1.,

            seed: None,
        }
    }
}

impl TrainerConfig {
    /// Reads and validates a JSON config file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses and validates a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// The inference tile size.
    pub fn patch_size(&self) -> usize {
        self.input_width
    }

    /// The `(rows, cols)` shape diagnostic batches are tiled into.
    pub fn sample_grid(&self) -> (usize, usize) {
        match self.sample_image_grid.as_slice() {
            [rows, cols, ..] => (*rows, *cols),
            [n] => (1, *n),
            [] => (0, 0),
        }
    }

    /// The number of held-out samples used for diagnostics.
    pub fn sample_num(&self) -> usize {
        self.sample_image_grid.iter().product()
    }

    /// How many buffer entries feed every discriminator and learner step.
    pub fn history_batch_size(&self) -> usize {
        self.batch_size / 2
    }

    /// Rejects configurations that can't possibly run.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TrainErr::InvalidConfig(msg));

        if !data::is_known(&self.data_set) {
            return invalid(format!("unknown data set: {}", self.data_set));
        }

        for (name, value) in [
            ("log_step", self.log_step as usize),
            ("pred_step_size", self.pred_step_size),
            ("buffer_size", self.buffer_size),
            ("input_width", self.input_width),
            ("input_height", self.input_height),
        ] {
            if value == 0 {
                return invalid(format!("{name} must be greater than 0"));
            }
        }

        if self.pred_step_size > self.patch_size() {
            return invalid(format!(
                "pred_step_size ({}) can't exceed the patch size ({}), tiles would leave gaps",
                self.pred_step_size,
                self.patch_size()
            ));
        }

        if self.batch_size < 2 {
            return invalid(format!(
                "batch_size ({}) must be at least 2, history samples take half of it",
                self.batch_size
            ));
        }

        for (name, value) in [
            ("pred_gkern_sig", self.pred_gkern_sig),
            ("pred_scaling", self.pred_scaling),
        ] {
            if !(value.is_finite() && value > 0.) {
                return invalid(format!("{name} must be a positive number, got {value}"));
            }
        }

        if self.sample_num() == 0 || self.sample_image_grid.len() > 2 {
            return invalid(format!(
                "sample_image_grid must be one or two positive sizes, got {:?}",
                self.sample_image_grid
            ));
        }

        let schedule = Schedule::from_config(self);
        if let Some((phase, objective)) = schedule.first_unfed_consumer() {
            return invalid(format!(
                "phase '{phase}' runs {objective} steps before any refiner output reaches the \
                 history buffer"
            ));
        }

        Ok(())
    }
}
