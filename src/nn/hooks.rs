//! Lifecycle plumbing: what a step reports, what an epoch adds up to, and the
//! dispatcher that calls a model's hooks for one pass over a stage.

use std::collections::BTreeMap;
use std::fmt;

use num::ToPrimitive;

use crate::error::Result;
use crate::nn::module::TrainableModel;
use crate::tensor::Numeric;
use crate::tree::ParamTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Train,
    Validation,
    Test,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Train => "train",
            Stage::Validation => "validation",
            Stage::Test => "test",
        })
    }
}

/// What a single train/validation/test step reports.
#[derive(Debug, Clone)]
pub struct StepOutput<T: Numeric> {
    pub loss: T,
    /// Gradients shaped like the model's parameters. `None` for evaluation
    /// steps.
    pub grads: Option<ParamTree<T>>,
    pub metrics: BTreeMap<String, f64>,
}

impl<T: Numeric> StepOutput<T> {
    pub fn new(loss: T) -> Self {
        StepOutput {
            loss,
            grads: None,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_grads(mut self, grads: ParamTree<T>) -> Self {
        self.grads = Some(grads);
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

/// Aggregate of one epoch of one stage, handed to the epoch-end hooks.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub stage: Stage,
    pub epoch: usize,
    pub steps: usize,
    /// `None` when no step ran.
    pub mean_loss: Option<f64>,
    /// Each metric averaged over the steps that reported it.
    pub metrics: BTreeMap<String, f64>,
    loss_sum: f64,
    metric_sums: BTreeMap<String, (f64, usize)>,
}

impl EpochSummary {
    pub fn new(stage: Stage, epoch: usize) -> Self {
        EpochSummary {
            stage,
            epoch,
            steps: 0,
            mean_loss: None,
            metrics: BTreeMap::new(),
            loss_sum: 0.0,
            metric_sums: BTreeMap::new(),
        }
    }

    pub fn record<T: Numeric>(&mut self, output: &StepOutput<T>) {
        self.steps += 1;
        self.loss_sum += output.loss.to_f64().unwrap_or(f64::NAN);
        self.mean_loss = Some(self.loss_sum / self.steps as f64);
        for (name, &value) in &output.metrics {
            let (sum, count) = self.metric_sums.entry(name.clone()).or_insert((0.0, 0));
            *sum += value;
            *count += 1;
            self.metrics.insert(name.clone(), *sum / *count as f64);
        }
    }

    pub fn from_outputs<T: Numeric>(stage: Stage, epoch: usize, outputs: &[StepOutput<T>]) -> Self {
        let mut summary = EpochSummary::new(stage, epoch);
        outputs.iter().for_each(|output| summary.record(output));
        summary
    }
}

/// Run one pass of `stage` over `batches`, then the matching epoch-end hook.
///
/// `after_step` sees every step output as it is produced, which is where a
/// caller applies gradients. Evaluation steps returning `None` are not
/// counted. The first error from a hook or from `after_step` aborts the pass.
pub fn run_epoch<T, M, F>(
    model: &mut M,
    stage: Stage,
    epoch: usize,
    batches: &[M::Batch],
    mut after_step: F,
) -> Result<EpochSummary>
where
    T: Numeric,
    M: TrainableModel<T> + ?Sized,
    F: FnMut(&M, &StepOutput<T>) -> Result<()>,
{
    let mut summary = EpochSummary::new(stage, epoch);
    for (batch_idx, batch) in batches.iter().enumerate() {
        let output = match stage {
            Stage::Train => Some(model.training_step(batch, batch_idx)?),
            Stage::Validation => model.validation_step(batch, batch_idx)?,
            Stage::Test => model.test_step(batch, batch_idx)?,
        };
        let Some(output) = output else {
            continue;
        };
        after_step(&*model, &output)?;
        summary.record(&output);
        tracing::trace!(%stage, epoch, batch_idx, "step done");
    }
    match stage {
        Stage::Train => model.on_train_epoch_end(&summary)?,
        Stage::Validation => model.on_validation_epoch_end(&summary)?,
        Stage::Test => model.on_test_epoch_end(&summary)?,
    }
    tracing::info!(
        %stage,
        epoch,
        steps = summary.steps,
        mean_loss = summary.mean_loss.unwrap_or(f64::NAN),
        "epoch finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarnessError;
    use crate::tensor::Param;

    /// Records which hooks fired. Its "loss" is just the batch value.
    struct Recorder {
        params: ParamTree<f64>,
        calls: Vec<String>,
        evaluates: bool,
    }

    impl Recorder {
        fn new(evaluates: bool) -> Self {
            Recorder {
                params: ParamTree::structure([("w", ParamTree::leaf(Param::scalar(0.0)))]),
                calls: vec![],
                evaluates,
            }
        }
    }

    impl TrainableModel<f64> for Recorder {
        type Batch = f64;

        fn parameters(&self) -> &ParamTree<f64> {
            &self.params
        }

        fn training_step(&mut self, batch: &f64, batch_idx: usize) -> Result<StepOutput<f64>> {
            self.calls.push(format!("train:{batch_idx}"));
            if batch.is_nan() {
                return Err(HarnessError::Model("nan batch".into()));
            }
            Ok(StepOutput::new(*batch).with_metric("double", batch * 2.0))
        }

        fn validation_step(&mut self, batch: &f64, batch_idx: usize) -> Result<Option<StepOutput<f64>>> {
            self.calls.push(format!("val:{batch_idx}"));
            Ok(self.evaluates.then(|| StepOutput::new(*batch)))
        }

        fn on_train_epoch_end(&mut self, summary: &EpochSummary) -> Result<()> {
            self.calls.push(format!("train_end:{}", summary.steps));
            Ok(())
        }

        fn on_validation_epoch_end(&mut self, summary: &EpochSummary) -> Result<()> {
            self.calls.push(format!("val_end:{}", summary.steps));
            Ok(())
        }
    }

    #[test]
    fn test_train_epoch_calls_hooks_in_order() {
        let mut model = Recorder::new(true);
        let mut seen = 0;
        let summary = run_epoch(&mut model, Stage::Train, 0, &[1.0, 3.0], |_, _| {
            seen += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, 2);
        assert_eq!(model.calls, vec!["train:0", "train:1", "train_end:2"]);
        assert_eq!(summary.mean_loss, Some(2.0));
        assert_eq!(summary.metrics.get("double"), Some(&4.0));
    }

    #[test]
    fn test_default_test_step_is_skipped() {
        let mut model = Recorder::new(true);
        let summary = run_epoch(&mut model, Stage::Test, 3, &[1.0], |_, _| Ok(())).unwrap();
        assert_eq!(summary.steps, 0);
        assert_eq!(summary.mean_loss, None);
        assert_eq!(summary.epoch, 3);
        assert!(model.calls.is_empty());
    }

    #[test]
    fn test_validation_none_not_counted() {
        let mut model = Recorder::new(false);
        let summary = run_epoch(&mut model, Stage::Validation, 0, &[1.0, 2.0], |_, _| Ok(())).unwrap();
        assert_eq!(summary.steps, 0);
        assert_eq!(model.calls, vec!["val:0", "val:1", "val_end:0"]);
    }

    #[test]
    fn test_step_error_aborts_epoch() {
        let mut model = Recorder::new(true);
        let err = run_epoch(&mut model, Stage::Train, 0, &[1.0, f64::NAN, 2.0], |_, _| Ok(()));
        assert!(matches!(err, Err(HarnessError::Model(_))));
        assert_eq!(model.calls, vec!["train:0", "train:1"]);
    }

    #[test]
    fn test_after_step_error_aborts_epoch() {
        let mut model = Recorder::new(true);
        let err = run_epoch(&mut model, Stage::Train, 0, &[1.0, 2.0], |_, _| {
            Err(HarnessError::Model("stop".into()))
        });
        assert!(err.is_err());
        assert_eq!(model.calls, vec!["train:0"]);
    }

    #[test]
    fn test_summary_averages_sparse_metrics() {
        let outputs = vec![
            StepOutput::new(1.0f32).with_metric("acc", 0.5),
            StepOutput::new(3.0f32),
            StepOutput::new(2.0f32).with_metric("acc", 1.0),
        ];
        let summary = EpochSummary::from_outputs(Stage::Validation, 1, &outputs);
        assert_eq!(summary.steps, 3);
        assert_eq!(summary.mean_loss, Some(2.0));
        assert_eq!(summary.metrics.get("acc"), Some(&0.75));
    }
}
