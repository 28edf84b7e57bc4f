use std::{fs, path::Path};

use super::error::{InferErr, Result};

/// The file listing the images of a prediction run.
pub const MANIFEST_FILE: &str = "image_resize_list.txt";

/// One image to predict and the factor it's resized by first.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub file_name: String,
    pub resize_factor: f64,
}

/// Reads `<image_dir>/image_resize_list.txt`.
pub fn read_manifest(image_dir: &Path) -> Result<Vec<ManifestEntry>> {
    let content = fs::read_to_string(image_dir.join(MANIFEST_FILE))?;
    parse_manifest(&content)
}

/// Parses whitespace-separated `file_name resize_factor` lines, skipping blank ones.
pub fn parse_manifest(content: &str) -> Result<Vec<ManifestEntry>> {
    let mut entries = Vec::new();

    for (i, line) in content.lines().enumerate() {
        let malformed = |reason: String| InferErr::Manifest {
            line: i + 1,
            reason,
        };

        let mut fields = line.split_whitespace();
        let Some(file_name) = fields.next() else {
            continue;
        };

        let factor = fields
            .next()
            .ok_or_else(|| malformed("missing resize factor".into()))?;
        let resize_factor: f64 = factor
            .parse()
            .map_err(|e| malformed(format!("resize factor {factor:?}: {e}")))?;

        if !(resize_factor.is_finite() && resize_factor > 0.) {
            return Err(malformed(format!(
                "resize factor must be positive, got {resize_factor}"
            )));
        }

        entries.push(ManifestEntry {
            file_name: file_name.to_string(),
            resize_factor,
        });
    }

    Ok(entries)
}
