//! Parameter trees and the traversal over their trainable leaves.

mod kind;
mod param_tree;
mod traverse;

pub use kind::*;
pub use param_tree::*;
pub use traverse::*;
