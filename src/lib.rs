//! Osh - a small interactive Unix shell with pipelines and job control.
#![recursion_limit = "1024"]

#[macro_use]
pub mod errors;
pub mod core;
pub mod editor;
pub mod shell;
mod util;

pub use crate::shell::{Shell, ShellConfig};
pub use crate::util::ShellExitStatusExt;
