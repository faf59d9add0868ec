pub mod config;
pub mod finder;
pub mod logging;
pub mod paths;

pub use config::*;
pub use finder::*;
pub use logging::*;
