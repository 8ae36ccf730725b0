//! Credential and configuration lookup by name.
//!
//! Provider handles never read `std::env` directly. They ask an
//! [`EnvironmentProvider`], which lets callers layer a dotenv file over the
//! process environment, pin fixed values in tests, or hide variables entirely.
//!
//! # Providers
//!
//! - [`OsEnvProvider`] reads the live process environment on every lookup.
//! - [`MapProvider`] serves a fixed set of values.
//! - [`EnvFileProvider`] serves the contents of a dotenv file, loaded once.
//! - [`MultiProvider`] chains providers; the first one reporting a value wins.
//!
//! # Example
//!
//! ```no_run
//! use environment::{EnvFileProvider, EnvironmentProvider, MultiProvider, OsEnvProvider};
//!
//! # async fn example() -> environment::Result<()> {
//! let env = MultiProvider::new()
//!     .with(OsEnvProvider)
//!     .with(EnvFileProvider::load(".env")?);
//!
//! if let Some(key) = env.get_non_empty("ANTHROPIC_API_KEY").await {
//!     println!("key has {} chars", key.len());
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod provider;

pub use error::{Error, Result};
pub use provider::{EnvFileProvider, EnvironmentProvider, MapProvider, MultiProvider, OsEnvProvider};
