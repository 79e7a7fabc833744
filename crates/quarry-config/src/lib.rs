//! # Quarry Configuration Library
//!
//! Configuration schema and loading for the Quarry sequencing service.
//!
//! ## Features
//!
//! - Multi-format support (TOML, YAML, JSON), chosen by file extension
//! - Serde defaults for every optional setting
//! - Validation of worker counts, queue capacity and processor sections
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quarry_config::ConfigLoader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::load_from_file("sequencing.toml").await?;
//!     println!("{} processors configured", config.processors.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod loader;
mod validation;

pub use config::*;
pub use loader::*;
pub use validation::*;
