//! rollcall-store — Files around the recognition core.
//!
//! Registry entries live as one JSON file per identity, enrollment samples
//! as JSON landmark dumps from the detector. Runtime settings come from a
//! TOML file and `ROLLCALL_*` environment variables.

pub mod config;
pub mod error;
pub mod registry_dir;
pub mod samples;

pub use config::{Config, ConfigError};
pub use error::StoreError;
pub use registry_dir::{RegistryEntry, RegistryStore};
pub use samples::{person_dirs, read_sample, sample_paths, SampleFile};
