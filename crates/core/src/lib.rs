pub mod config;
pub mod cursor;
pub mod error;

pub use config::Config;
pub use cursor::*;
pub use error::*;
