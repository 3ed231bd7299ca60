//! Compile a pod description into a bash script that runs it on a local container engine.
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! let spec = podscript::PodSpec::from_file("pod.toml".as_ref())?;
//! let unit = podscript::compile(&spec)?;
//! print!("{}", unit);
//! # Ok(())
//! # }
//! ```

pub mod compiler;
pub mod config;
pub mod error;
pub mod exitcode;
pub mod kubestuff;
pub mod naming;
pub mod podspec;
pub mod script;
pub mod validate;

mod init;
mod launch;
mod monitor;
mod provision;
mod teardown;

pub use compiler::{compile, CompiledUnit, Compiler};
pub use config::{CompileOptions, NetworkMode, PodName};
pub use error::{ManifestError, ValidationError};
pub use podspec::PodSpec;
