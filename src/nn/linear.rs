use num::traits::Float;
use rand::Rng;

use crate::error::{HarnessError, Result};
use crate::init;
use crate::nn::hooks::StepOutput;
use crate::nn::module::TrainableModel;
use crate::tensor::{Numeric, Param};
use crate::tree::ParamTree;

/// Row-major `[rows, in_features]` inputs and `[rows, out_features]` targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    pub inputs: Vec<T>,
    pub targets: Vec<T>,
}

/// `y = x W + b`, trained against mean squared error.
#[derive(Debug)]
pub struct Linear<T>
where
    T: Numeric,
{
    // same handles as the leaves of `params`
    weights: Param<T>,
    bias: Param<T>,
    params: ParamTree<T>,
}

impl<T> Linear<T>
where
    T: Numeric + Float,
{
    /// `weights` is `[in, out]`, `bias` is `[out]`.
    pub fn new(weights: Param<T>, bias: Param<T>) -> Result<Self> {
        if weights.shape().len() != 2 || bias.shape() != [weights.shape()[1]] {
            return Err(HarnessError::ShapeMismatch {
                expected: weights.shape().get(1).map(|&out| vec![out]).unwrap_or_default(),
                found: bias.shape().to_vec(),
            });
        }
        let params = ParamTree::structure([
            ("weight", ParamTree::leaf(weights.clone())),
            ("bias", ParamTree::leaf(bias.clone())),
        ]);
        Ok(Linear {
            weights,
            bias,
            params,
        })
    }

    /// Xavier-uniform weights and zero bias.
    pub fn init<R: Rng + ?Sized>(in_features: usize, out_features: usize, rng: &mut R) -> Result<Self> {
        let weights = init::xavier_uniform(in_features, out_features, rng)?;
        Linear::new(weights, init::zeros(vec![out_features]))
    }

    pub fn weights(&self) -> &Param<T> {
        &self.weights
    }

    pub fn bias(&self) -> &Param<T> {
        &self.bias
    }

    pub fn in_features(&self) -> usize {
        self.weights.shape()[0]
    }

    pub fn out_features(&self) -> usize {
        self.weights.shape()[1]
    }

    fn rows(&self, batch: &Batch<T>) -> Result<usize> {
        let (fan_in, fan_out) = (self.in_features(), self.out_features());
        let rows = if fan_in == 0 { 0 } else { batch.inputs.len() / fan_in };
        self.check_inputs(&batch.inputs, rows)?;
        if batch.targets.len() != rows * fan_out {
            return Err(HarnessError::ShapeMismatch {
                expected: vec![rows, fan_out],
                found: vec![batch.targets.len()],
            });
        }
        Ok(rows)
    }

    fn check_inputs(&self, inputs: &[T], rows: usize) -> Result<()> {
        let fan_in = self.in_features();
        if rows.checked_mul(fan_in) != Some(inputs.len()) {
            return Err(HarnessError::ShapeMismatch {
                expected: vec![rows, fan_in],
                found: vec![inputs.len()],
            });
        }
        Ok(())
    }

    /// `inputs` is row-major `[rows, in_features]`.
    pub fn forward(&self, inputs: &[T], rows: usize) -> Result<Vec<T>> {
        self.check_inputs(inputs, rows)?;
        let (fan_in, fan_out) = (self.in_features(), self.out_features());
        let w = self.weights.data();
        let b = self.bias.data();
        let mut out = Vec::with_capacity(rows * fan_out);
        for r in 0..rows {
            let x = &inputs[r * fan_in..(r + 1) * fan_in];
            for j in 0..fan_out {
                let mut acc = b[j];
                for k in 0..fan_in {
                    acc += x[k] * w[k * fan_out + j];
                }
                out.push(acc);
            }
        }
        Ok(out)
    }

    fn mse(&self, batch: &Batch<T>) -> Result<(usize, Vec<T>, T)> {
        let rows = self.rows(batch)?;
        let preds = self.forward(&batch.inputs, rows)?;
        let n: T = num::cast(preds.len().max(1)).unwrap_or_else(T::one);
        let loss = preds
            .iter()
            .zip(&batch.targets)
            .fold(T::zero(), |acc, (&p, &t)| acc + (p - t) * (p - t))
            / n;
        Ok((rows, preds, loss))
    }

    fn eval_output(&self, batch: &Batch<T>) -> Result<StepOutput<T>> {
        let (_, preds, loss) = self.mse(batch)?;
        let n = preds.len().max(1) as f64;
        let mae = preds
            .iter()
            .zip(&batch.targets)
            .filter_map(|(&p, &t)| (p - t).abs().to_f64())
            .sum::<f64>()
            / n;
        Ok(StepOutput::new(loss).with_metric("mae", mae))
    }
}

impl<T: Numeric + Float> TrainableModel<T> for Linear<T> {
    type Batch = Batch<T>;

    fn parameters(&self) -> &ParamTree<T> {
        &self.params
    }

    fn training_step(&mut self, batch: &Batch<T>, _batch_idx: usize) -> Result<StepOutput<T>> {
        let (rows, preds, loss) = self.mse(batch)?;
        let (fan_in, fan_out) = (self.in_features(), self.out_features());
        let two = T::one() + T::one();
        let n: T = num::cast(preds.len().max(1)).unwrap_or_else(T::one);

        // dL/dy = 2 (y - t) / n
        let dy: Vec<T> = preds
            .iter()
            .zip(&batch.targets)
            .map(|(&p, &t)| two * (p - t) / n)
            .collect();
        let mut dw = vec![T::zero(); fan_in * fan_out];
        let mut db = vec![T::zero(); fan_out];
        for r in 0..rows {
            for j in 0..fan_out {
                let g = dy[r * fan_out + j];
                db[j] += g;
                for k in 0..fan_in {
                    dw[k * fan_out + j] += batch.inputs[r * fan_in + k] * g;
                }
            }
        }

        let grads = ParamTree::structure([
            ("weight", ParamTree::leaf(Param::new(dw, vec![fan_in, fan_out]))),
            ("bias", ParamTree::leaf(Param::new(db, vec![fan_out]))),
        ]);
        Ok(StepOutput::new(loss).with_grads(grads))
    }

    fn validation_step(&mut self, batch: &Batch<T>, _batch_idx: usize) -> Result<Option<StepOutput<T>>> {
        self.eval_output(batch).map(Some)
    }

    fn test_step(&mut self, batch: &Batch<T>, _batch_idx: usize) -> Result<Option<StepOutput<T>>> {
        self.eval_output(batch).map(Some)
    }
}

#[test]
fn test_layer_forward() {
    let layer = Linear::new(
        Param::new(vec![1.0, -2.0, -1.1, 0.7], vec![2, 2]),
        Param::new_with_filler(vec![2], 1.0),
    )
    .unwrap();
    let out = layer.forward(&[1.0, 2.0], 1).unwrap();
    assert!((out[0] - (1.0 - 2.2 + 1.0)).abs() < 1e-12);
    assert!((out[1] - (-2.0 + 1.4 + 1.0)).abs() < 1e-12);
}

#[test]
fn test_layer_rejects_bad_bias() {
    let res = Linear::new(
        Param::new_with_filler(vec![2, 3], 1.0f32),
        Param::new_with_filler(vec![2], 1.0),
    );
    assert!(matches!(res, Err(HarnessError::ShapeMismatch { .. })));
}

#[test]
fn test_params_share_storage_with_fields() {
    let layer = Linear::new(
        Param::new_with_filler(vec![1, 1], 1.0f64),
        Param::new_with_filler(vec![1], 0.0),
    )
    .unwrap();
    let names: Vec<_> = layer.named_parameters().into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["weight", "bias"]);
    layer.weights().update(vec![5.0]).unwrap();
    let w = layer.parameters().get("weight").and_then(ParamTree::as_param).map(|p| p.to_vec());
    assert_eq!(w, Some(vec![5.0]));
    assert_eq!(layer.num_parameters(), 2);
}

#[test]
fn test_gradient_matches_finite_difference() {
    let mut layer = Linear::new(
        Param::new(vec![0.3, -0.2, 0.5, 0.1], vec![2, 2]),
        Param::new(vec![0.05, -0.05], vec![2]),
    )
    .unwrap();
    let batch = Batch {
        inputs: vec![1.0, 2.0, -1.0, 0.5],
        targets: vec![0.0, 1.0, 1.0, 0.0],
    };
    let out = layer.training_step(&batch, 0).unwrap();
    let grads = out.grads.unwrap();
    let dw = grads.get("weight").and_then(ParamTree::as_param).unwrap().to_vec();

    let eps = 1e-6;
    let base = layer.weights().to_vec();
    for i in 0..base.len() {
        let mut bumped = base.clone();
        bumped[i] += eps;
        layer.weights().update(bumped).unwrap();
        let (_, _, plus) = layer.mse(&batch).unwrap();
        layer.weights().update(base.clone()).unwrap();
        let numeric = (plus - out.loss) / eps;
        assert!((numeric - dw[i]).abs() < 1e-4, "i={i} numeric={numeric} analytic={}", dw[i]);
    }
}

#[test]
fn test_batch_shape_checked() {
    let mut layer = Linear::new(
        Param::new_with_filler(vec![2, 1], 1.0f64),
        Param::new_with_filler(vec![1], 0.0),
    )
    .unwrap();
    let batch = Batch {
        inputs: vec![1.0, 2.0, 3.0],
        targets: vec![1.0],
    };
    assert!(layer.training_step(&batch, 0).is_err());
}

#[test]
fn test_forward_rejects_short_input() {
    let layer = Linear::new(
        Param::new_with_filler(vec![2, 1], 1.0f64),
        Param::new_with_filler(vec![1], 0.0),
    )
    .unwrap();
    assert!(matches!(
        layer.forward(&[1.0], 1),
        Err(HarnessError::ShapeMismatch { .. })
    ));
    assert!(layer.forward(&[1.0, 2.0, 3.0], 1).is_err());
}

#[test]
fn test_sgd_through_parameters_changes_forward() {
    let layer = Linear::new(
        Param::new(vec![1.0, 1.0], vec![2, 1]),
        Param::new(vec![0.0], vec![1]),
    )
    .unwrap();
    let before = layer.forward(&[1.0, 2.0], 1).unwrap();
    let grads = layer
        .parameters()
        .map_leaves(|p| Param::new_with_filler(p.shape().to_vec(), 1.0));
    crate::optim::sgd::sgd_step(layer.parameters(), &grads, 0.5).unwrap();
    let after = layer.forward(&[1.0, 2.0], 1).unwrap();
    // each weight and the bias drop by 0.5: 3.0 -> 0.5 + 1.0 - 0.5
    assert_eq!(before, vec![3.0]);
    assert_eq!(after, vec![1.0]);
    assert_eq!(layer.weights().to_vec(), vec![0.5, 0.5]);
}
