use crate::error::Result;
use crate::nn::hooks::{EpochSummary, StepOutput};
use crate::tensor::{Numeric, Param};
use crate::tree::{traverse, ParamTree};

/// The base abstraction for anything that can be trained.
///
/// A model owns its parameters as a [`ParamTree`] and reports one
/// [`StepOutput`] per batch. Gradients come back in a tree shaped like the
/// parameters, which is what [`sgd_step`](crate::optim::sgd::sgd_step) zips
/// against.
///
/// Only `parameters` and `training_step` are required. The evaluation steps
/// default to "not implemented for this model" (`Ok(None)`) and the epoch-end
/// hooks to no-ops.
pub trait TrainableModel<T: Numeric> {
    type Batch;

    fn parameters(&self) -> &ParamTree<T>;

    fn training_step(&mut self, batch: &Self::Batch, batch_idx: usize) -> Result<StepOutput<T>>;

    fn validation_step(
        &mut self,
        _batch: &Self::Batch,
        _batch_idx: usize,
    ) -> Result<Option<StepOutput<T>>> {
        Ok(None)
    }

    fn test_step(&mut self, _batch: &Self::Batch, _batch_idx: usize) -> Result<Option<StepOutput<T>>> {
        Ok(None)
    }

    fn on_train_epoch_end(&mut self, _summary: &EpochSummary) -> Result<()> {
        Ok(())
    }

    fn on_validation_epoch_end(&mut self, _summary: &EpochSummary) -> Result<()> {
        Ok(())
    }

    fn on_test_epoch_end(&mut self, _summary: &EpochSummary) -> Result<()> {
        Ok(())
    }

    fn num_parameters(&self) -> usize {
        self.parameters().num_parameters()
    }

    fn named_parameters(&self) -> Vec<(String, Param<T>)> {
        self.parameters().named_leaves()
    }

    /// Drop every stored gradient.
    fn zero_grad(&self) -> Result<()> {
        traverse(|param: &Param<T>, _| param.zero_grad(), self.parameters(), &[])?;
        Ok(())
    }
}
