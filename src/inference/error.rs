use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use crate::error::BoxedErr;

pub type Result<T> = std::result::Result<T, InferErr>;

/// The errors that can abort a prediction run.
#[derive(Debug)]
pub enum InferErr {
    Io(io::Error),
    Image(image::ImageError),
    Manifest { line: usize, reason: String },
    ImageTooSmall {
        height: usize,
        width: usize,
        patch: usize,
    },
    InvalidStride {
        step: usize,
        patch: usize,
    },
    ShapeMismatch {
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    Model(BoxedErr),
}

impl Display for InferErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferErr::Io(e) => write!(f, "io error: {e}"),
            InferErr::Image(e) => write!(f, "image error: {e}"),
            InferErr::Manifest { line, reason } => {
                write!(f, "malformed manifest line {line}: {reason}")
            }
            InferErr::ImageTooSmall {
                height,
                width,
                patch,
            } => write!(
                f,
                "image of {height}x{width} is smaller than the {patch}x{patch} patch"
            ),
            InferErr::InvalidStride { step, patch } => write!(
                f,
                "tile stride {step} must be between 1 and the patch size {patch}"
            ),
            InferErr::ShapeMismatch { got, expected } => {
                write!(f, "model output shape {got:?}, expected {expected:?}")
            }
            InferErr::Model(e) => write!(f, "learner forward pass failed: {e}"),
        }
    }
}

impl Error for InferErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            InferErr::Io(e) => Some(e),
            InferErr::Image(e) => Some(e),
            InferErr::Model(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for InferErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<image::ImageError> for InferErr {
    fn from(value: image::ImageError) -> Self {
        Self::Image(value)
    }
}
