pub mod config;
pub mod synthesize;
pub mod transcribe;

pub use config::*;
pub use synthesize::*;
pub use transcribe::*;
