//! In-memory preparation stages, applied in order: encode, window, split

pub mod encode;
pub mod split;
pub mod window;

pub use encode::{encode, velocity_bin, EncodedSequence, FEATURE_WIDTH};
pub use split::split;
pub use window::{window, window_with_hop, Sample, SamplePool};
