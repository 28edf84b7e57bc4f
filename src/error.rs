use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use crate::model::Objective;

/// The result type used by the training side of the crate.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// The error type a `Model` implementation reports back to the orchestrator.
pub type BoxedErr = Box<dyn Error + Send + Sync + 'static>;

/// Training, configuration and replay buffer failures.
#[derive(Debug)]
pub enum TrainErr {
    Io(io::Error),
    Image(image::ImageError),
    Json(serde_json::Error),
    Shape(ndarray::ShapeError),
    InvalidConfig(String),
    BufferEmpty,
    ShapeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    Model {
        objective: Objective,
        source: BoxedErr,
    },
}

impl TrainErr {
    /// Wraps a model failure with the sub-objective whose step raised it.
    pub fn model(objective: Objective, source: BoxedErr) -> Self {
        Self::Model { objective, source }
    }
}

impl Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainErr::Io(e) => write!(f, "io error: {e}"),
            TrainErr::Image(e) => write!(f, "image error: {e}"),
            TrainErr::Json(e) => write!(f, "invalid json: {e}"),
            TrainErr::Shape(e) => write!(f, "tensor shape error: {e}"),
            TrainErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            TrainErr::BufferEmpty => {
                write!(f, "tried to sample the history buffer before anything was pushed")
            }
            TrainErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(f, "shape mismatch for {what}: got {got}, expected {expected}"),
            TrainErr::Model { objective, source } => {
                write!(f, "{objective} step failed: {source}")
            }
        }
    }
}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainErr::Io(e) => Some(e),
            TrainErr::Image(e) => Some(e),
            TrainErr::Json(e) => Some(e),
            TrainErr::Shape(e) => Some(e),
            TrainErr::Model { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for TrainErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<image::ImageError> for TrainErr {
    fn from(value: image::ImageError) -> Self {
        Self::Image(value)
    }
}

impl From<serde_json::Error> for TrainErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<ndarray::ShapeError> for TrainErr {
    fn from(value: ndarray::ShapeError) -> Self {
        Self::Shape(value)
    }
}
