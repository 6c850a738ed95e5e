pub mod archive;
pub mod clip;
pub mod correction;
pub mod kinematics;
pub mod math;
pub mod pipeline;
pub mod skeleton;
pub mod velocity;

pub use archive::{ArchiveWriter, BvhWriter, ClipWriter, NdArray, NpzWriter, Record};
pub use clip::{AnimationBuffer, Clip, Pose};
pub use correction::{preset, CorrectionTable};
pub use kinematics::GlobalFrame;
pub use pipeline::{correct, process, Options};
pub use skeleton::{Joint, Skeleton};
pub use velocity::KinematicFields;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid topology: {0}")]
    InvalidTopology(String),
    #[error("incomplete correction table: {0}")]
    IncompleteCorrectionTable(String),
    #[error("{fps} fps is not a multiple of {expected} fps")]
    FrameRateMismatch { fps: u32, expected: u32 },
    #[error("frame time must be positive and finite, got {0}")]
    InvalidFrameTime(f32),
    #[error("clip has already been corrected")]
    AlreadyCorrected,
    #[error("need at least 2 frames, got {0}")]
    TooFewFrames(usize),
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("failed to parse correction table")]
    Table(#[from] toml::de::Error),
    #[error("failed to serialize: {0}")]
    Serialize(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
