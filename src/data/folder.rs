use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, info};
use ndarray::{s, Array3};
use rand::{rngs::StdRng, Rng};

use super::{DataLoader, RealBatch};
use crate::{
    error::{Result, TrainErr},
    imaging::{imread, stack_batch},
};

const MASK_SUFFIX: &str = "_mask";
const REFER_SUFFIX: &str = "_refer";

/// Reads a data set laid out on disk as:
///
/// ```text
/// <data_dir>/real/<name>.png        real image
/// <data_dir>/real/<name>_mask.png   its mask
/// <data_dir>/synthetic/<name>.png   synthetic image
/// <data_dir>/synthetic/<name>_refer.png  its reference image
/// ```
///
/// Every batch is made of random crops of random real images, the same crop being taken from
/// the image and its mask.
#[derive(Debug)]
pub struct FolderDataLoader {
    real_paths: Vec<PathBuf>,
    synthetic_paths: Vec<PathBuf>,
    batch_size: usize,
    crop: (usize, usize),
    rng: StdRng,
}

impl FolderDataLoader {
    /// Lists the data set under `data_dir`.
    ///
    /// # Arguments
    /// * `data_dir` - The data set root.
    /// * `batch_size` - The amount of crops per batch.
    /// * `crop` - The `(height, width)` of every crop.
    /// * `rng` - Picks images and crop origins.
    ///
    /// # Returns
    /// An error if the directories can't be read or hold no images.
    pub fn open(
        data_dir: &Path,
        batch_size: usize,
        crop: (usize, usize),
        rng: StdRng,
    ) -> Result<Self> {
        let real_paths = list_images(&data_dir.join("real"), MASK_SUFFIX)?;
        let synthetic_paths = list_images(&data_dir.join("synthetic"), REFER_SUFFIX)?;

        if real_paths.is_empty() || synthetic_paths.is_empty() {
            return Err(TrainErr::InvalidConfig(format!(
                "data set at {} needs both real and synthetic images",
                data_dir.display()
            )));
        }

        info!(
            "data set loaded: {} real and {} synthetic images",
            real_paths.len(),
            synthetic_paths.len()
        );

        Ok(Self {
            real_paths,
            synthetic_paths,
            batch_size,
            crop,
            rng,
        })
    }

    fn random_crop(&mut self, path: &Path) -> Result<(Array3<f32>, Array3<f32>)> {
        let image = imread(path)?;
        let mask = imread(&with_suffix(path, MASK_SUFFIX))?;

        let (h, w, _) = image.dim();
        let (mh, mw, _) = mask.dim();
        if (mh, mw) != (h, w) {
            return Err(TrainErr::ShapeMismatch {
                what: "mask height",
                got: mh,
                expected: h,
            });
        }

        let (ch, cw) = self.crop;
        if h < ch || w < cw {
            let (got, expected) = if h < ch { (h, ch) } else { (w, cw) };
            return Err(TrainErr::ShapeMismatch {
                what: "real image side",
                got,
                expected,
            });
        }

        let y = self.rng.random_range(0..=h - ch);
        let x = self.rng.random_range(0..=w - cw);
        let window = s![y..y + ch, x..x + cw, ..];

        Ok((
            image.slice(window).to_owned(),
            mask.slice(window).to_owned(),
        ))
    }
}

impl DataLoader for FolderDataLoader {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn next_batch(&mut self) -> Result<RealBatch> {
        let mut images = Vec::with_capacity(self.batch_size);
        let mut masks = Vec::with_capacity(self.batch_size);

        for _ in 0..self.batch_size {
            let idx = self.rng.random_range(0..self.real_paths.len());
            let path = self.real_paths[idx].clone();
            let (image, mask) = self.random_crop(&path)?;
            images.push(image);
            masks.push(mask);
        }

        debug!("drew a real batch of {}", self.batch_size);

        RealBatch::new(stack_batch(&images)?, stack_batch(&masks)?)
    }

    fn synthetic_data_paths(&self) -> &[PathBuf] {
        &self.synthetic_paths
    }

    fn reference_path(&self, synthetic: &Path) -> PathBuf {
        with_suffix(synthetic, REFER_SUFFIX)
    }
}

/// `dir/name.png` -> `dir/name<suffix>.png`.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    path.with_file_name(format!("{stem}{suffix}.png"))
}

/// Sorted `.png` files of `dir` whose stem doesn't end with `skip_suffix`.
fn list_images(dir: &Path, skip_suffix: &str) -> io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_png = path.extension().is_some_and(|ext| ext == "png");
        let skipped = path
            .file_stem()
            .is_some_and(|stem| stem.to_string_lossy().ends_with(skip_suffix));

        if is_png && !skipped {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}
