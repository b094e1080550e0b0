pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use config::ForgeConfig;
pub use error::{ForgeError, Result};
pub use types::*;
