//! Element types and parameter dtype conversion.

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::DTypeError;
use crate::tensor::{Numeric, Param};
use crate::tree::ParamTree;

// Below this many elements a leaf is converted on the calling thread.
const PARALLEL_CAST_THRESHOLD: usize = 1 << 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    U8,
    I32,
    I64,
    F32,
    F64,
}

impl DType {
    pub fn of<T: Numeric>() -> DType {
        T::DTYPE
    }

    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::U8 => 1,
            DType::I32 | DType::F32 => 4,
            DType::I64 | DType::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DType::U8 => "u8",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::F32 => "f32",
            DType::F64 => "f64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DType {
    type Err = DTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "u8" => Ok(DType::U8),
            "i32" => Ok(DType::I32),
            "i64" => Ok(DType::I64),
            "f32" | "float32" => Ok(DType::F32),
            "f64" | "float64" => Ok(DType::F64),
            _ => Err(DTypeError::Unknown(s.to_string())),
        }
    }
}

/// Convert a parameter element-wise into fresh storage.
///
/// The gradient is not carried over; `requires_grad` is. Fails on the first
/// element `U` cannot represent (e.g. a negative value cast to `u8`, or a NaN
/// cast to an integer).
pub fn cast_param<T: Numeric, U: Numeric>(param: &Param<T>) -> Result<Param<U>, DTypeError> {
    let convert = |(index, &value): (usize, &T)| {
        num::cast::<T, U>(value).ok_or_else(|| DTypeError::Unrepresentable {
            index,
            value: format!("{value:?}"),
            target: U::DTYPE,
        })
    };
    let data = param.data();
    let array = if data.len() >= PARALLEL_CAST_THRESHOLD {
        data.par_iter()
            .enumerate()
            .map(convert)
            .collect::<Result<Vec<U>, _>>()?
    } else {
        data.iter()
            .enumerate()
            .map(convert)
            .collect::<Result<Vec<U>, _>>()?
    };
    Ok(Param::new(array, param.shape().to_vec()).with_requires_grad(param.requires_grad()))
}

/// Structure-preserving conversion of every leaf of `tree`.
pub fn cast_tree<T: Numeric, U: Numeric>(tree: &ParamTree<T>) -> Result<ParamTree<U>, DTypeError> {
    let converted = tree.try_map_leaves(cast_param::<T, U>)?;
    let (from, to) = (T::DTYPE, U::DTYPE);
    tracing::debug!(
        %from,
        %to,
        leaves = converted.num_leaves(),
        "converted parameter tree"
    );
    Ok(converted)
}

pub fn to_f32<T: Numeric>(tree: &ParamTree<T>) -> Result<ParamTree<f32>, DTypeError> {
    cast_tree(tree)
}

pub fn to_f64<T: Numeric>(tree: &ParamTree<T>) -> Result<ParamTree<f64>, DTypeError> {
    cast_tree(tree)
}
