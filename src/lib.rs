//! Parameter-tree utilities for training small models.
//!
//! The centre of the crate is [`tree::traverse`], which walks the trainable
//! leaves of a [`tree::ParamTree`] while zipping in companion trees such as
//! gradients. [`optim::sgd`], [`dtype`] conversion and the
//! [`nn::TrainableModel`] hooks are built on top of it.

pub mod config;
pub mod dtype;
pub mod error;
pub mod init;
pub mod nn;
pub mod optim;
pub mod seed;
pub mod tensor;
pub mod tree;

pub use error::{HarnessError, Result};
