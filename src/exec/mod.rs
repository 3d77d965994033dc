// src/exec/mod.rs

//! Unit execution layer.
//!
//! - [`unit`] defines the [`Unit`] trait the scheduler drives. Units are
//!   opaque to the scheduler; tests supply their own implementations.
//! - [`command`] provides [`CommandUnit`], the shell-command unit built from
//!   `[unit.<name>]` config tables.

pub mod command;
pub mod unit;

pub use command::{CommandUnit, render_command};
pub use unit::{SharedUnit, Unit, UnitFuture};
