//! Semi-space copying garbage collector for compiled programs
//!
//! Generated code tags every stack and heap word, which lets the collector find its roots exactly
//! by scanning the machine stack. See [`word`] for the encoding, [`heap::Collector`] for the
//! collector itself and [`compiler_support`] for the C ABI used by generated code.

#![warn(clippy::all)]

pub mod compiler_support;
pub mod config;
pub mod error;
pub mod heap;
pub mod word;

pub use crate::config::{Config, Validation};
pub use crate::error::{Error, ErrorKind, Result, Violation};
pub use crate::heap::{Collector, Space, Stats};
pub use crate::word::{Header, ObjectRef, Value, Word};
