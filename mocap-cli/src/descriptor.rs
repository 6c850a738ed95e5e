use anyhow::*;
use serde::{Deserialize, Serialize};

use std::path::PathBuf;
use std::str::FromStr;

/// What `convert` writes for each motion file.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Kinematic features as a NumPy archive
    Npz,
    /// The corrected clip itself
    Bvh,
}

impl Default for Format {
    fn default() -> Self {
        Format::Npz
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "npz" => Ok(Format::Npz),
            "bvh" => Ok(Format::Bvh),
            other => bail!("unknown format `{}`, expected npz or bvh", other),
        }
    }
}

/// Defaults for `convert`, read from `config.toml`. Flags on the command
/// line win over anything set here.
#[derive(Default, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    pub extension: Option<String>,
    pub actors: Vec<String>,
    pub base_fps: Option<u32>,
    pub fps: Option<u32>,
    pub table: Option<PathBuf>,
    pub preset: Option<String>,
    pub jobs: Option<usize>,
    pub format: Option<Format>,
}
