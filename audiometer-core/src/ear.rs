use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which side of the headphones a run is presented to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ear {
    Left,
    Right,
    #[default]
    Both,
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown ear '{0}', expected left, right or both")]
pub struct ParseEarError(pub String);

impl Ear {
    /// Channel gains as (left, right).
    pub fn gains(&self) -> (f32, f32) {
        match self {
            Ear::Left => (1.0, 0.0),
            Ear::Right => (0.0, 1.0),
            Ear::Both => (1.0, 1.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Ear::Left => "left",
            Ear::Right => "right",
            Ear::Both => "both",
        }
    }
}

impl fmt::Display for Ear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ear {
    type Err = ParseEarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(Ear::Left),
            "right" | "r" => Ok(Ear::Right),
            "both" | "b" => Ok(Ear::Both),
            other => Err(ParseEarError(other.to_string())),
        }
    }
}
