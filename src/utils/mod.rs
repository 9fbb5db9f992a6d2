pub mod buffer;
pub mod progress;
