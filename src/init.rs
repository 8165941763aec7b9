//! Parameter initialisers drawing from a caller-owned RNG.

use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::error::{DTypeError, HarnessError, Result};
use crate::tensor::{Numeric, Param};

fn sample<T, D, R>(shape: Vec<usize>, dist: D, rng: &mut R) -> Result<Param<T>>
where
    T: Numeric,
    D: Distribution<f64>,
    R: Rng + ?Sized,
{
    let total: usize = shape.iter().product();
    let array = (0..total)
        .map(|index| {
            let value = dist.sample(rng);
            num::cast::<f64, T>(value).ok_or_else(|| DTypeError::Unrepresentable {
                index,
                value: value.to_string(),
                target: T::DTYPE,
            })
        })
        .collect::<std::result::Result<Vec<T>, _>>()?;
    Ok(Param::new(array, shape))
}

/// Draw from `N(0, std²)`.
pub fn normal<T: Numeric, R: Rng + ?Sized>(
    shape: Vec<usize>,
    std: f64,
    rng: &mut R,
) -> Result<Param<T>> {
    let dist = Normal::new(0.0, std).map_err(|e| HarnessError::Init(e.to_string()))?;
    sample(shape, dist, rng)
}

/// Draw from `U[-bound, bound]`.
pub fn uniform<T: Numeric, R: Rng + ?Sized>(
    shape: Vec<usize>,
    bound: f64,
    rng: &mut R,
) -> Result<Param<T>> {
    if !(bound.is_finite() && bound >= 0.0) {
        return Err(HarnessError::Init(format!(
            "uniform bound must be finite and non-negative, got {bound}"
        )));
    }
    sample(shape, Uniform::new_inclusive(-bound, bound), rng)
}

/// Glorot/Xavier uniform for a `[fan_in, fan_out]` weight.
pub fn xavier_uniform<T: Numeric, R: Rng + ?Sized>(
    fan_in: usize,
    fan_out: usize,
    rng: &mut R,
) -> Result<Param<T>> {
    let bound = (6.0 / (fan_in + fan_out).max(1) as f64).sqrt();
    uniform(vec![fan_in, fan_out], bound, rng)
}

pub fn zeros<T: Numeric>(shape: Vec<usize>) -> Param<T> {
    Param::new_with_filler(shape, T::zero())
}
