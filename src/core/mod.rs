//! Core types shared by every stage of the pipeline: configuration and errors.

mod config;
mod error;

pub use config::{Config, EmitterConfig, PathsConfig, ResolverConfig};
pub use error::{FlowError, FlowResult};
