use std::path::{Path, PathBuf};

use ndarray::{Array3, Array4, ArrayView4, Axis};
use tempfile::{tempdir, TempDir};

use segmentation_orchestration::{
    data::{DataLoader, RealBatch},
    imaging::imwrite,
    model::{
        DiscrimFeed, LearnerFeed, ModelResult, RefinerFeed, Snapshot, SnapshotFeed, SnapshotGroup,
        StepResult,
    },
    summary::Summary,
    Model, Objective, PatchPredictor, ReplayBatch, TrainErr, TrainerConfig, TrainingContext,
    TrainingOrchestrator,
};

const SIDE: usize = 4;

/// Counts its steps and records everything the orchestrator asks of it.
#[derive(Default)]
struct RecordingModel {
    steps: [u64; 3],
    calls: Vec<Objective>,
    summarize: Vec<bool>,
    with_output: Vec<bool>,
    snapshots: Vec<SnapshotGroup>,
    fail_on: Option<Objective>,
}

impl RecordingModel {
    fn step(&mut self, objective: Objective, summarize: bool) -> ModelResult<StepResult> {
        if self.fail_on == Some(objective) {
            return Err(format!("{objective} diverged").into());
        }

        self.calls.push(objective);
        self.summarize.push(summarize);

        let counter = &mut self.steps[objective as usize];
        *counter += 1;

        Ok(StepResult {
            step: *counter,
            output: None,
            summary: summarize.then(|| Summary::new().with_scalar("loss", 0.1)),
        })
    }
}

impl PatchPredictor for RecordingModel {
    fn test_learner_patch(&mut self, patches: ArrayView4<'_, f32>) -> ModelResult<Array4<f32>> {
        let (n, h, w, _) = patches.dim();
        Ok(Array4::zeros((n, h, w, 1)))
    }
}

impl Model for RecordingModel {
    fn train_refiner(&mut self, feed: &RefinerFeed, summarize: bool) -> ModelResult<StepResult> {
        self.with_output.push(feed.with_output);
        let mut res = self.step(Objective::Refiner, summarize)?;

        if feed.with_output {
            let (n, value) = (feed.synthetic_batch_size, res.step as f32);
            let fill = |c| Array4::from_elem((n, SIDE, SIDE, c), value);
            res.output = Some(ReplayBatch::new(fill(3), fill(1), fill(3))?);
        }

        Ok(res)
    }

    fn train_discrim(&mut self, feed: &DiscrimFeed<'_>, summarize: bool) -> ModelResult<StepResult> {
        assert_eq!(feed.refined_history.len_of(Axis(0)), feed.synthetic_batch_size);
        assert_eq!(feed.reference_history.len_of(Axis(0)), feed.synthetic_batch_size);
        let (n, h, w, _) = feed.real_images.dim();
        let (mn, mh, mw, channels) = feed.real_masks.dim();
        assert_eq!((mn, mh, mw), (n, h, w));
        assert_eq!(channels, 1);
        self.step(Objective::Discriminator, summarize)
    }

    fn train_learner(&mut self, feed: &LearnerFeed<'_>, summarize: bool) -> ModelResult<StepResult> {
        assert_eq!(feed.mask_history.len_of(Axis(0)), feed.synthetic_batch_size);
        self.step(Objective::Learner, summarize)
    }

    fn snapshot(&mut self, group: SnapshotGroup, feed: &SnapshotFeed<'_>) -> ModelResult<Snapshot> {
        self.snapshots.push(group);

        let output = match group {
            SnapshotGroup::SyntheticImages | SnapshotGroup::RefinedImages => {
                feed.synthetic.to_owned()
            }
            SnapshotGroup::ReferImages => feed.reference.to_owned(),
            SnapshotGroup::LearnerOutputs => {
                let (n, h, w, _) = feed.synthetic.dim();
                Array4::from_elem((n, h, w, 1), 255.)
            }
        };

        let shape = output.shape();
        let summary =
            Summary::new().with_images(group.tag(), [shape[0], shape[1], shape[2], shape[3]]);
        Ok(Snapshot { summary, output })
    }
}

/// Serves constant real batches and synthetic images from disk.
struct MemoryLoader {
    batch_size: usize,
    synthetic: Vec<PathBuf>,
}

impl DataLoader for MemoryLoader {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn next_batch(&mut self) -> segmentation_orchestration::Result<RealBatch> {
        RealBatch::new(
            Array4::from_elem((self.batch_size, SIDE, SIDE, 3), 90.),
            Array4::from_elem((self.batch_size, SIDE, SIDE, 1), 255.),
        )
    }

    fn synthetic_data_paths(&self) -> &[PathBuf] {
        &self.synthetic
    }

    fn reference_path(&self, synthetic: &Path) -> PathBuf {
        let stem = synthetic.file_stem().unwrap().to_string_lossy();
        synthetic.with_file_name(format!("{stem}_refer.png"))
    }
}

struct Setup {
    dir: TempDir,
    config: TrainerConfig,
    loader: MemoryLoader,
}

/// A config that runs nothing, with small images written to a temporary directory.
fn setup() -> Setup {
    let dir = tempdir().unwrap();

    let mut synthetic = Vec::new();
    for i in 0..2 {
        let path = dir.path().join(format!("syn{i}.png"));
        imwrite(&path, Array3::from_elem((6, 6, 3), 30. * i as f32).view()).unwrap();
        imwrite(
            &dir.path().join(format!("syn{i}_refer.png")),
            Array3::from_elem((6, 6, 3), 200.).view(),
        )
        .unwrap();
        synthetic.push(path);
    }

    let config = TrainerConfig {
        batch_size: 4,
        input_height: SIDE,
        input_width: SIDE,
        pred_step_size: SIDE,
        buffer_size: 8,
        sample_image_grid: vec![2, 2],
        model_dir: dir.path().join("model"),
        sample_dir: dir.path().join("samples"),
        seed: Some(7),
        initial_k_g: 0,
        initial_k_d: 0,
        k_g: 0,
        k_d: 0,
        k_l: 0,
        max_step_d_g: 0,
        initial_k_l: 0,
        max_step_d_g_l: 0,
        after_k_l: 0,
        ..TrainerConfig::default()
    };

    let loader = MemoryLoader {
        batch_size: config.batch_size,
        synthetic,
    };

    Setup {
        dir,
        config,
        loader,
    }
}

fn orchestrator(
    config: TrainerConfig,
    model: RecordingModel,
    loader: MemoryLoader,
) -> TrainingOrchestrator<RecordingModel, MemoryLoader, Vec<(u64, Summary)>> {
    let ctx = TrainingContext::from_config(&config).unwrap();
    TrainingOrchestrator::new(ctx, config, model, loader, Vec::new()).unwrap()
}

#[test]
fn refiner_warm_up_of_ten_pushes_once() {
    let Setup {
        dir: _dir,
        mut config,
        loader,
    } = setup();
    config.initial_k_g = 10;

    let mut orchestrator = orchestrator(config, RecordingModel::default(), loader);
    let state = orchestrator.train().unwrap();

    assert_eq!(state.step(Objective::Refiner), 10);
    assert_eq!(state.step(Objective::Discriminator), 0);
    assert_eq!(state.pushes(), 1);

    let model = orchestrator.model();
    assert_eq!(model.calls, vec![Objective::Refiner; 10]);
    let pushed: Vec<_> = (0..10).filter(|&i| model.with_output[i]).collect();
    assert_eq!(pushed, vec![9]);

    // One batch of four refined images, all from step 10.
    let history = orchestrator.history();
    assert_eq!(history.len(), 4);
    assert!(history.iter().all(|e| e.refined[[0, 0, 0]] == 10.));
}

#[test]
fn phases_run_in_order() {
    let Setup {
        dir: _dir,
        mut config,
        loader,
    } = setup();
    config.initial_k_g = 2;
    config.initial_k_d = 1;
    config.max_step_d_g = 1;
    config.k_g = 1;
    config.k_d = 2;
    config.initial_k_l = 1;
    config.max_step_d_g_l = 1;
    config.k_l = 1;
    config.after_k_l = 1;

    let mut orchestrator = orchestrator(config, RecordingModel::default(), loader);
    let state = orchestrator.train().unwrap();

    use Objective::*;
    assert_eq!(
        orchestrator.model().calls,
        vec![
            Refiner,
            Refiner,
            Discriminator,
            Refiner,
            Discriminator,
            Discriminator,
            Learner,
            Refiner,
            Learner,
            Discriminator,
            Learner,
        ]
    );

    assert_eq!(state.step(Refiner), 4);
    assert_eq!(state.step(Discriminator), 4);
    assert_eq!(state.step(Learner), 3);
    // The last warm-up step and both joint refiner steps.
    assert_eq!(state.pushes(), 3);
}

#[test]
fn diagnostics_every_log_step() {
    let Setup {
        dir,
        mut config,
        loader,
    } = setup();
    config.initial_k_g = 5;
    config.log_step = 2;

    let mut orchestrator = orchestrator(config, RecordingModel::default(), loader);
    orchestrator.train().unwrap();

    use SnapshotGroup::*;
    let model = orchestrator.model();
    assert_eq!(
        model.snapshots,
        vec![
            RefinedImages,
            LearnerOutputs,
            SyntheticImages,
            ReferImages,
            RefinedImages,
            LearnerOutputs,
        ]
    );

    // Steps 1..=5: a summary is asked for right after steps 2 and 4.
    assert_eq!(model.summarize, vec![false, false, true, false, true]);

    let samples = dir.path().join("samples");
    for name in [
        "test_refined_images_2",
        "test_learner_outputs_2",
        "test_synthetic_images_2",
        "test_refer_images_2",
        "test_refined_images_4",
        "test_learner_outputs_4",
    ] {
        assert!(samples.join(format!("{name}.png")).exists(), "{name}");
    }
    assert!(!samples.join("test_synthetic_images_4.png").exists());
    assert!(!samples.join("test_refer_images_4.png").exists());

    let steps: Vec<_> = orchestrator.summaries().iter().map(|(s, _)| *s).collect();
    assert_eq!(steps, vec![2, 2, 2, 2, 3, 4, 4, 5]);
}

#[test]
fn failing_step_aborts_the_run() {
    let Setup {
        dir: _dir,
        mut config,
        loader,
    } = setup();
    config.initial_k_g = 3;
    config.initial_k_d = 2;
    config.after_k_l = 2;

    let model = RecordingModel {
        fail_on: Some(Objective::Discriminator),
        ..RecordingModel::default()
    };

    let mut orchestrator = orchestrator(config, model, loader);
    let err = orchestrator.train().unwrap_err();

    assert!(matches!(
        err,
        TrainErr::Model {
            objective: Objective::Discriminator,
            ..
        }
    ));
    assert_eq!(orchestrator.model().calls, vec![Objective::Refiner; 3]);
}

#[test]
fn parameter_servers_do_not_train() {
    let Setup {
        dir: _dir,
        mut config,
        loader,
    } = setup();
    config.job_name = "ps".into();

    let ctx = TrainingContext::from_config(&config).unwrap();
    let res = TrainingOrchestrator::new(ctx, config, RecordingModel::default(), loader, Vec::new());
    assert!(matches!(res, Err(TrainErr::InvalidConfig(_))));
}

#[test]
fn boxed_loader_from_the_registry() {
    let Setup {
        dir, mut config, ..
    } = setup();

    let data_dir = dir.path().join("nuclei");
    for (sub, name) in [
        ("real", "r"),
        ("real", "r_mask"),
        ("synthetic", "s"),
        ("synthetic", "s_refer"),
    ] {
        std::fs::create_dir_all(data_dir.join(sub)).unwrap();
        let channels = if name.ends_with("_mask") { 1 } else { 3 };
        imwrite(
            &data_dir.join(sub).join(format!("{name}.png")),
            Array3::from_elem((8, 8, channels), 100.).view(),
        )
        .unwrap();
    }

    config.data_dir = data_dir;
    config.initial_k_g = 1;
    config.initial_k_d = 2;

    let mut ctx = TrainingContext::from_config(&config).unwrap();
    let loader = segmentation_orchestration::data::from_config(&config, &mut ctx.rng).unwrap();
    let mut orchestrator =
        TrainingOrchestrator::new(ctx, config, RecordingModel::default(), loader, Vec::new())
            .unwrap();

    let state = orchestrator.train().unwrap();
    assert_eq!(state.step(Objective::Discriminator), 2);
}
