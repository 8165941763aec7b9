use crate::tensor::Param;

pub type ParamList<T> = Vec<Param<T>>;

/// Dimensions, outermost first. Empty for a scalar.
pub type Shape = Vec<usize>;
