pub mod clip;
pub mod sequence;
pub mod track;

pub use clip::Clip;
pub use sequence::{Sequence, SequenceSettings};
pub use track::{Track, TrackKind};
