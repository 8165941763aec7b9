//! Stateless gradient descent: `p -= lr * g` for every trainable leaf.

use crate::error::{HarnessError, Result};
use crate::tensor::{Numeric, Param};
use crate::tree::{traverse, traverse_with_path, Companion, ParamTree};

/// Apply one SGD update, pairing each leaf of `params` with the leaf at the
/// same path in `grads`.
///
/// Leaves that do not require a gradient, or whose gradient is absent (a
/// dict in `grads` lacking the key), are left alone. Returns how many leaves
/// were updated. A gradient whose length differs from its parameter is a
/// [`HarnessError::ShapeMismatch`]; leaves visited before it keep their
/// update.
pub fn sgd_step<T: Numeric>(params: &ParamTree<T>, grads: &ParamTree<T>, lr: T) -> Result<usize> {
    let mut updated = 0;
    let mut failure: Option<HarnessError> = None;
    traverse_with_path(
        |param: &Param<T>, path: &str, companions: &[Companion<'_, ParamTree<T>>]| {
            if failure.is_some() || !param.requires_grad() {
                return;
            }
            let Some(grad) = companions[0].leaf() else {
                tracing::trace!(path, "no gradient, skipping");
                return;
            };
            // copy first: `grads` may hold the very same handle as `params`
            let delta = grad.to_vec();
            match param.sub_scaled(&delta, lr) {
                Ok(()) => updated += 1,
                Err(err) => failure = Some(err),
            }
        },
        params,
        &[grads],
    )?;
    if let Some(err) = failure {
        return Err(err);
    }
    tracing::debug!(updated, "sgd step");
    Ok(updated)
}

/// Like [`sgd_step`], but each parameter uses the gradient stored on it,
/// which is cleared afterwards.
pub fn sgd_step_from_grad<T: Numeric>(params: &ParamTree<T>, lr: T) -> Result<usize> {
    let mut updated = 0;
    let mut failure: Option<HarnessError> = None;
    traverse(
        |param: &Param<T>, _| {
            if failure.is_some() || !param.requires_grad() {
                return;
            }
            if let Some(grad) = param.take_grad() {
                match param.sub_scaled(&grad, lr) {
                    Ok(()) => updated += 1,
                    Err(err) => failure = Some(err),
                }
            }
        },
        params,
        &[],
    )?;
    match failure {
        Some(err) => Err(err),
        None => {
            tracing::debug!(updated, "sgd step from stored gradients");
            Ok(updated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TreeError;

    fn model() -> ParamTree<f64> {
        ParamTree::structure([
            ("w", ParamTree::leaf(Param::new(vec![1.0, 2.0], vec![2]))),
            (
                "heads",
                ParamTree::dict([
                    ("a", ParamTree::leaf(Param::scalar(3.0))),
                    ("b", ParamTree::leaf(Param::scalar(4.0))),
                ]),
            ),
        ])
    }

    fn values(tree: &ParamTree<f64>) -> Vec<f64> {
        tree.leaves().iter().flat_map(|p| p.to_vec()).collect()
    }

    #[test]
    fn test_step_moves_against_gradient() {
        let params = model();
        let grads = params.map_leaves(|p| Param::new_with_filler(p.shape().to_vec(), 1.0));
        let updated = sgd_step(&params, &grads, 0.5).unwrap();
        assert_eq!(updated, 3);
        assert_eq!(values(&params), vec![0.5, 1.5, 2.5, 3.5]);
    }

    #[test]
    fn test_absent_gradient_skipped() {
        let params = model();
        let grads = ParamTree::structure([
            ("w", ParamTree::leaf(Param::new(vec![2.0, 2.0], vec![2]))),
            ("heads", ParamTree::dict([("b", ParamTree::leaf(Param::scalar(2.0)))])),
        ]);
        assert_eq!(sgd_step(&params, &grads, 0.25).unwrap(), 2);
        assert_eq!(values(&params), vec![0.5, 1.5, 3.0, 3.5]);
    }

    #[test]
    fn test_frozen_leaf_untouched() {
        let params = ParamTree::structure([
            ("w", ParamTree::leaf(Param::scalar(1.0))),
            ("frozen", ParamTree::leaf(Param::frozen(vec![1.0], vec![]))),
        ]);
        let grads = params.map_leaves(|p| Param::new_with_filler(p.shape().to_vec(), 1.0));
        assert_eq!(sgd_step(&params, &grads, 1.0).unwrap(), 1);
        assert_eq!(values(&params), vec![0.0, 1.0]);
    }

    #[test]
    fn test_missing_struct_field_is_an_error() {
        let params = model();
        let grads = ParamTree::structure([("w", ParamTree::leaf(Param::new(vec![0.0, 0.0], vec![2])))]);
        let err = sgd_step(&params, &grads, 1.0).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Tree(TreeError::StructuralMismatch { ref key, .. }) if key == "heads"
        ));
        assert_eq!(values(&params), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_wrong_gradient_length() {
        let params = ParamTree::structure([("w", ParamTree::leaf(Param::new(vec![1.0, 2.0], vec![2])))]);
        let grads = ParamTree::structure([("w", ParamTree::leaf(Param::scalar(1.0)))]);
        assert!(matches!(
            sgd_step(&params, &grads, 1.0),
            Err(HarnessError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_params_as_their_own_gradient() {
        let params = model();
        sgd_step(&params, &params, 0.5).unwrap();
        assert_eq!(values(&params), vec![0.5, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn test_step_from_stored_grad_clears_it() {
        let params = model();
        let w = params.get("w").and_then(ParamTree::as_param).unwrap();
        w.set_grad(vec![2.0, 4.0]).unwrap();
        assert_eq!(sgd_step_from_grad(&params, 0.5).unwrap(), 1);
        assert_eq!(w.to_vec(), vec![0.0, 0.0]);
        assert!(!w.has_grad());
        assert_eq!(sgd_step_from_grad(&params, 0.5).unwrap(), 0);
    }
}
