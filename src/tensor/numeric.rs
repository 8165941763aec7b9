pub use num::{NumCast, One, Zero};
use std::cmp::PartialEq;

pub use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use crate::dtype::DType;

/// Element types a [`Param`](crate::tensor::Param) can hold.
///
/// `Send + Sync` so leaf data can be converted on the rayon pool.
pub trait Numeric:
    Add<Output = Self>
    + AddAssign
    + Copy
    + Clone
    + One
    + Mul<Output = Self>
    + Sub<Output = Self>
    + SubAssign
    + PartialEq
    + PartialOrd
    + Zero
    + NumCast
    + Send
    + Sync
    + std::fmt::Debug
    + 'static
{
    const DTYPE: DType;
}

// https://stackoverflow.com/questions/42381185/specifying-generic-parameter-to-belong-to-a-small-set-of-types
macro_rules! numeric_impl {
    ($($t: ty => $dtype: ident),+) => {
        $(
            impl Numeric for $t {
                const DTYPE: DType = DType::$dtype;
            }
        )+
    }
}

numeric_impl!(u8 => U8, i32 => I32, i64 => I64, f32 => F32, f64 => F64);
