pub mod ear;
pub mod phase;
pub mod stimulus;
pub mod trial;

pub use ear::{Ear, ParseEarError};
pub use phase::{Phase, StandardPhase};
pub use stimulus::{Stimulus, Tone};
pub use trial::Trial;
