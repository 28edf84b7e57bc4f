mod folder;
mod loader;

pub use folder::FolderDataLoader;
pub use loader::{DataLoader, RealBatch};

use rand::{rngs::StdRng, SeedableRng};

use crate::{
    config::TrainerConfig,
    error::{Result, TrainErr},
};

/// The nuclei segmentation data set, laid out as a `FolderDataLoader` expects.
pub const NUCLEI: &str = "nuclei";

/// Whether `key` names a registered data set.
pub fn is_known(key: &str) -> bool {
    key == NUCLEI
}

/// Builds the data loader registered under `config.data_set`.
///
/// # Arguments
/// * `config` - The trainer configuration.
/// * `rng` - Seeds the loader's own random number generator.
pub fn from_config(config: &TrainerConfig, rng: &mut StdRng) -> Result<Box<dyn DataLoader>> {
    match config.data_set.as_str() {
        NUCLEI => {
            let loader = FolderDataLoader::open(
                &config.data_dir,
                config.batch_size,
                (config.input_height, config.input_width),
                StdRng::from_rng(rng),
            )?;
            Ok(Box::new(loader))
        }
        other => Err(TrainErr::InvalidConfig(format!("unknown data set: {other}"))),
    }
}
