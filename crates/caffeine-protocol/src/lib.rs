pub mod config;
pub mod error;
pub mod wire;

pub use config::*;
pub use error::*;
pub use wire::*;
