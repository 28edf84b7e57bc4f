use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::Serialize;

/// Scalars and image records a model reports for one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub scalars: BTreeMap<String, f32>,
    /// Image group name to the NHWC shape of the recorded batch.
    pub images: BTreeMap<String, [usize; 4]>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scalar(mut self, name: impl Into<String>, value: f32) -> Self {
        self.scalars.insert(name.into(), value);
        self
    }

    pub fn with_images(mut self, tag: impl Into<String>, shape: [usize; 4]) -> Self {
        self.images.insert(tag.into(), shape);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty() && self.images.is_empty()
    }
}

/// Where summaries end up.
pub trait SummarySink {
    fn add_summary(&mut self, summary: &Summary, step: u64) -> io::Result<()>;
}

/// Keeps every summary in memory, mostly useful for tests and dry runs.
impl SummarySink for Vec<(u64, Summary)> {
    fn add_summary(&mut self, summary: &Summary, step: u64) -> io::Result<()> {
        self.push((step, summary.clone()));
        Ok(())
    }
}

#[derive(Serialize)]
struct Record<'a> {
    step: u64,
    #[serde(flatten)]
    summary: &'a Summary,
}

/// Appends one JSON object per summary to `<model_dir>/summaries.jsonl`.
pub struct JsonlSummaryWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl JsonlSummaryWriter {
    pub const FILE_NAME: &'static str = "summaries.jsonl";

    /// Opens (or creates) the summary file inside `model_dir`.
    pub fn create(model_dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(model_dir)?;
        let path = model_dir.join(Self::FILE_NAME);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            out: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SummarySink for JsonlSummaryWriter {
    fn add_summary(&mut self, summary: &Summary, step: u64) -> io::Result<()> {
        let record = Record { step, summary };
        serde_json::to_writer(&mut self.out, &record)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}
