//! Trainable models and the hooks they expose to a training loop.

mod hooks;
pub mod linear;
mod module;

pub use hooks::*;
pub use linear::{Batch, Linear};
pub use module::*;
