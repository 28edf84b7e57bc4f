use std::{env, path::Path, process};

use anyhow::{bail, Context};
use log::info;

use segmentation_orchestration::{
    imaging::scaled_dims,
    inference::{needs_resize, read_manifest, TileGrid},
    Schedule, TrainerConfig, TrainingContext,
};

const USAGE: &str = "usage:
    segmentation-orchestration plan <config.json>
    segmentation-orchestration tiles <config.json> <image_dir>";

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let result = match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["plan", config] => plan(Path::new(config)),
        ["tiles", config, image_dir] => tiles(Path::new(config), Path::new(image_dir)),
        _ => {
            eprintln!("{USAGE}");
            process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn load_config(path: &Path) -> anyhow::Result<TrainerConfig> {
    TrainerConfig::from_path(path).with_context(|| format!("loading {}", path.display()))
}

/// Validates the config and logs the training schedule it describes.
fn plan(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let ctx = TrainingContext::from_config(&config)?;
    info!(
        "{} task {} on {} (chief: {})",
        ctx.job,
        ctx.task_index,
        ctx.worker_device(),
        ctx.is_chief()
    );

    let schedule = Schedule::from_config(&config);
    for phase in schedule.phases() {
        let steps: Vec<_> = phase
            .steps
            .iter()
            .map(|s| format!("{} x{}", s.objective, s.repeat))
            .collect();
        info!("{}: {} x [{}]", phase.name, phase.outer, steps.join(", "));
    }

    let totals = schedule.step_totals();
    info!(
        "refiner steps: {}, discriminator steps: {}, learner steps: {}, buffer pushes: {}",
        totals.refiner, totals.discriminator, totals.learner, totals.pushes
    );

    Ok(())
}

/// Reports how many tiles each listed image needs.
fn tiles(config_path: &Path, image_dir: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let ps = config.patch_size();

    for entry in read_manifest(image_dir)? {
        let path = image_dir.join(&entry.file_name);
        let (w, h) = image::image_dimensions(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let (w, h) = if needs_resize(entry.resize_factor) {
            scaled_dims(w, h, entry.resize_factor)
        } else {
            (w, h)
        };

        let (h, w) = (h as usize, w as usize);
        if h < ps || w < ps {
            bail!("{} is {h}x{w}, smaller than the {ps}x{ps} patch", entry.file_name);
        }

        let upright = TileGrid::new(h, w, ps, config.pred_step_size);
        let rotated = TileGrid::new(w, h, ps, config.pred_step_size);
        info!(
            "{}: {h}x{w}, {}x{} tiles upright, {} forward passes over 8 orientations",
            entry.file_name,
            upright.rows.len(),
            upright.cols.len(),
            4 * (upright.rows.len() + rotated.rows.len())
        );
    }

    Ok(())
}
