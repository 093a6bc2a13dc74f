//! Runner module containing all execution-related components.

pub mod config;
pub mod executor;
pub mod io;
pub mod language;
pub mod limits;
pub mod staging;
