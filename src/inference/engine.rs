use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use ndarray::{s, Array2, Array3, Array4, ArrayView2, Axis};

use super::{
    error::{InferErr, Result},
    gkern,
    manifest::read_manifest,
    TileGrid,
};
use crate::{
    config::TrainerConfig,
    imaging::{gray_image, imread_rgb, normalize, resize_gray, resize_rgb},
    model::PatchPredictor,
};

/// Resize factors closer to one than this are treated as one.
pub const RESIZE_EPS: f64 = 0.001;

/// Whether an image has to be resized by `factor`.
pub fn needs_resize(factor: f64) -> bool {
    (factor - 1.).abs() >= RESIZE_EPS
}

/// Predicts full-resolution masks with a trained learner.
///
/// Every image is covered with overlapping `ps x ps` tiles in each of its eight orientations
/// (two mirror states, four rotations). Tile predictions are weighted by a Gaussian kernel
/// centered on the tile and averaged.
pub struct InferenceEngine<P: PatchPredictor> {
    predictor: P,
    ps: usize,
    step_size: usize,
    pred_scaling: f64,
    gsm: Array2<f32>,
}

impl<P: PatchPredictor> InferenceEngine<P> {
    /// Creates a new `InferenceEngine`.
    ///
    /// # Arguments
    /// * `predictor` - Runs the learner on batches of patches.
    /// * `ps` - The patch size.
    /// * `step_size` - The stride between tile origins.
    /// * `gkern_sig` - The spread of the blending kernel, in standard deviations per side.
    /// * `pred_scaling` - An extra factor the output is scaled back by.
    ///
    /// # Returns
    /// An error if `step_size` is zero or larger than `ps`, which would leave pixels between
    /// tiles uncovered.
    pub fn new(
        predictor: P,
        ps: usize,
        step_size: usize,
        gkern_sig: f64,
        pred_scaling: f64,
    ) -> Result<Self> {
        if ps == 0 || step_size == 0 || step_size > ps {
            return Err(InferErr::InvalidStride {
                step: step_size,
                patch: ps,
            });
        }

        Ok(Self {
            predictor,
            ps,
            step_size,
            pred_scaling,
            gsm: gkern(ps, gkern_sig),
        })
    }

    pub fn from_config(predictor: P, config: &TrainerConfig) -> Result<Self> {
        Self::new(
            predictor,
            config.patch_size(),
            config.pred_step_size,
            config.pred_gkern_sig,
            config.pred_scaling,
        )
    }

    /// Predicts a mask for every image listed in `<image_dir>/image_resize_list.txt` and writes
    /// it next to the image as `<stem>_pred.png`.
    ///
    /// # Returns
    /// The written paths, in manifest order.
    pub fn cnn_pred_mask(&mut self, image_dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = read_manifest(image_dir)?;
        if entries.is_empty() {
            warn!("nothing to predict in {}", image_dir.display());
        }

        info!(
            "{} images to segment, scaling factor {}",
            entries.len(),
            self.pred_scaling
        );

        let mut written = Vec::with_capacity(entries.len());
        for entry in entries {
            info!("segmenting {}", entry.file_name);

            let path = image_dir.join(&entry.file_name);
            let img = load_image(&path, entry.resize_factor)?;
            let pred = self.predict(&img)?;

            let out = pred_path(&path);
            write_prediction(&out, pred.view(), entry.resize_factor * self.pred_scaling)?;
            written.push(out);
        }

        Ok(written)
    }

    /// Predicts the mask of one normalized `(h, w, c)` image.
    pub fn predict(&mut self, img: &Array3<f32>) -> Result<Array2<f32>> {
        let (pred, num) = self.accumulate(img)?;
        Ok(pred / num)
    }

    /// Runs every tile of every orientation and returns the weighted prediction sum along with
    /// the weight sum, both back in the orientation of `img`.
    pub(crate) fn accumulate(&mut self, img: &Array3<f32>) -> Result<(Array2<f32>, Array2<f32>)> {
        let (height, width, _) = img.dim();
        if height < self.ps || width < self.ps {
            return Err(InferErr::ImageTooSmall {
                height,
                width,
                patch: self.ps,
            });
        }

        let mut img = img.clone();
        let mut pred = Array2::zeros((height, width));
        let mut num = Array2::zeros((height, width));

        // Two mirror states of four rotations each; the last rotation of each state and the
        // second mirror bring everything back to where it started.
        for _ in 0..2 {
            img.invert_axis(Axis(0));
            pred.invert_axis(Axis(0));
            num.invert_axis(Axis(0));

            for _ in 0..4 {
                img.swap_axes(0, 1);
                img.invert_axis(Axis(0));
                pred.swap_axes(0, 1);
                pred.invert_axis(Axis(0));
                num.swap_axes(0, 1);
                num.invert_axis(Axis(0));

                self.accumulate_orientation(&img, &mut pred, &mut num)?;
            }
        }

        Ok((pred, num))
    }

    fn accumulate_orientation(
        &mut self,
        img: &Array3<f32>,
        pred: &mut Array2<f32>,
        num: &mut Array2<f32>,
    ) -> Result<()> {
        let ps = self.ps;
        let (height, width, channels) = img.dim();
        let grid = TileGrid::new(height, width, ps, self.step_size);
        debug!("{height}x{width} orientation: {} tiles", grid.len());

        for &x in &grid.rows {
            let mut patches = Array4::zeros((grid.cols.len(), ps, ps, channels));
            for (mut patch, &y) in patches.axis_iter_mut(Axis(0)).zip(&grid.cols) {
                patch.assign(&img.slice(s![x..x + ps, y..y + ps, ..]));
            }

            let out = self
                .predictor
                .test_learner_patch(patches.view())
                .map_err(InferErr::Model)?;

            let expected = [grid.cols.len(), ps, ps, 1];
            if out.shape() != expected {
                return Err(InferErr::ShapeMismatch {
                    got: out.shape().to_vec(),
                    expected: expected.to_vec(),
                });
            }

            for (j, &y) in grid.cols.iter().enumerate() {
                let weighted = &out.slice(s![j, .., .., 0]) * &self.gsm;

                let mut pred_tile = pred.slice_mut(s![x..x + ps, y..y + ps]);
                pred_tile += &weighted;
                let mut num_tile = num.slice_mut(s![x..x + ps, y..y + ps]);
                num_tile += &self.gsm;
            }
        }

        Ok(())
    }
}

/// Reads an image as RGB, resizes it by `factor` if needed and normalizes it to `[-1, 1]`.
pub fn load_image(path: &Path, factor: f64) -> Result<Array3<f32>> {
    let img = imread_rgb(path)?;
    let img = if needs_resize(factor) {
        resize_rgb(img.view(), factor)?
    } else {
        img
    };

    Ok(normalize(&img))
}

/// `dir/name.ext` -> `dir/name_pred.png`.
pub fn pred_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    path.with_file_name(format!("{stem}_pred.png"))
}

/// Writes a `[0, 1]` prediction as an 8-bit grey image, scaled back by the inverse of
/// `factor` if needed.
fn write_prediction(path: &Path, pred: ArrayView2<'_, f32>, factor: f64) -> Result<()> {
    let grey = gray_image(pred, 255.)?;
    let grey = if needs_resize(factor) {
        resize_gray(&grey, 1. / factor)
    } else {
        grey
    };

    grey.save(path)?;
    Ok(())
}
