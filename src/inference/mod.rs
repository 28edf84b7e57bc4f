mod engine;
mod error;
mod kernel;
mod manifest;
mod tiling;

pub use engine::{load_image, needs_resize, pred_path, InferenceEngine, RESIZE_EPS};
pub use error::{InferErr, Result};
pub use kernel::gkern;
pub use manifest::{parse_manifest, read_manifest, ManifestEntry, MANIFEST_FILE};
pub use tiling::{tile_origins, TileGrid};
