pub mod bridge;
pub mod reassembler;

pub use bridge::ProgressBridge;
pub use reassembler::{utf8_char_len, TextUnit, Utf8Reassembler};
