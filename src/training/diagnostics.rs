use std::{
    fs,
    path::{Path, PathBuf},
};

use ndarray::{s, Array3, Array4, ArrayView4};
use rand::Rng;

use crate::{
    data::DataLoader,
    error::{Result, TrainErr},
    imaging::{img_tile, imread, imwrite, stack_batch},
    model::SnapshotFeed,
};

/// Held-out synthetic images and their references, fed to every diagnostic forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSamples {
    pub synthetic: Array4<f32>,
    pub reference: Array4<f32>,
}

impl TestSamples {
    /// Draws `n` synthetic images (with replacement) from `loader` and reads them along with
    /// their reference images, keeping the top-left `crop` of each.
    ///
    /// # Arguments
    /// * `loader` - Lists the synthetic images and maps them to their references.
    /// * `rng` - Picks the samples.
    /// * `n` - The amount of samples.
    /// * `crop` - The `(height, width)` kept from every image.
    pub fn draw<D, R>(loader: &D, rng: &mut R, n: usize, crop: (usize, usize)) -> Result<Self>
    where
        D: DataLoader + ?Sized,
        R: Rng,
    {
        let paths = loader.synthetic_data_paths();
        if paths.is_empty() {
            return Err(TrainErr::InvalidConfig(
                "no synthetic images to draw test samples from".into(),
            ));
        }

        let mut synthetic = Vec::with_capacity(n);
        let mut reference = Vec::with_capacity(n);

        for _ in 0..n {
            let path = &paths[rng.random_range(0..paths.len())];
            synthetic.push(read_cropped(path, crop)?);
            reference.push(read_cropped(&loader.reference_path(path), crop)?);
        }

        Ok(Self {
            synthetic: stack_batch(&synthetic)?,
            reference: stack_batch(&reference)?,
        })
    }

    pub fn feed(&self) -> SnapshotFeed<'_> {
        SnapshotFeed {
            synthetic: self.synthetic.view(),
            reference: self.reference.view(),
        }
    }
}

fn read_cropped(path: &Path, (height, width): (usize, usize)) -> Result<Array3<f32>> {
    let img = imread(path)?;
    let (h, w, _) = img.dim();

    if h < height || w < width {
        let (got, expected) = if h < height { (h, height) } else { (w, width) };
        return Err(TrainErr::ShapeMismatch {
            what: "test sample side",
            got,
            expected,
        });
    }

    Ok(img.slice(s![..height, ..width, ..]).to_owned())
}

/// Tiles `batch` into a `grid` and writes it to `<sample_dir>/<tag>_<step>.png`.
///
/// # Returns
/// The path written to.
pub fn write_snapshot(
    sample_dir: &Path,
    tag: &str,
    step: u64,
    batch: ArrayView4<'_, f32>,
    grid: (usize, usize),
) -> Result<PathBuf> {
    fs::create_dir_all(sample_dir)?;

    let path = sample_dir.join(format!("{tag}_{step}.png"));
    let tile = img_tile(batch, grid)?;
    imwrite(&path, tile.view())?;

    Ok(path)
}
