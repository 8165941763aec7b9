//! Fit a single linear layer to a noisy synthetic target.
//!
//! Usage: light_harness [--config config.json] [--save-config out.json] [--batches 8] [--batch-size 16]
//! Set `RUST_LOG=light_harness=debug` to see per-step updates.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use num::traits::Float;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing_subscriber::EnvFilter;

use light_harness::config::HarnessConfig;
use light_harness::dtype::DType;
use light_harness::nn::{run_epoch, Batch, Linear, Stage, TrainableModel};
use light_harness::optim::sgd::sgd_step;
use light_harness::seed::seed_everything;
use light_harness::tensor::Numeric;

const TRUE_WEIGHTS: [[f64; 2]; 3] = [[1.5, -0.5], [0.25, 2.0], [-1.0, 0.75]];
const TRUE_BIAS: [f64; 2] = [0.5, -0.25];
const NOISE_STD: f64 = 0.05;

#[derive(Parser, Debug)]
#[command(name = "light_harness", about = "Train a linear layer with stateless SGD")]
struct Args {
    /// Path to config JSON. Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective config here before training.
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Training batches per epoch.
    #[arg(long, default_value_t = 8)]
    batches: usize,

    #[arg(long, default_value_t = 16)]
    batch_size: usize,
}

fn cast<T: Numeric>(value: f64) -> anyhow::Result<T> {
    num::cast(value).with_context(|| format!("{value} is not representable as {}", T::DTYPE))
}

fn synthetic_batches<T, R>(rng: &mut R, count: usize, rows: usize) -> anyhow::Result<Vec<Batch<T>>>
where
    T: Numeric,
    R: Rng + ?Sized,
{
    let (fan_in, fan_out) = (TRUE_WEIGHTS.len(), TRUE_BIAS.len());
    let input = Normal::new(0.0, 1.0)?;
    let noise = Normal::new(0.0, NOISE_STD)?;
    (0..count)
        .map(|_| -> anyhow::Result<Batch<T>> {
            let mut inputs = Vec::with_capacity(rows * fan_in);
            let mut targets = Vec::with_capacity(rows * fan_out);
            for _ in 0..rows {
                let x: Vec<f64> = (0..fan_in).map(|_| input.sample(rng)).collect();
                for j in 0..fan_out {
                    let y = TRUE_BIAS[j]
                        + (0..fan_in).map(|k| x[k] * TRUE_WEIGHTS[k][j]).sum::<f64>()
                        + noise.sample(rng);
                    targets.push(cast::<T>(y)?);
                }
                for v in x {
                    inputs.push(cast::<T>(v)?);
                }
            }
            Ok(Batch { inputs, targets })
        })
        .collect()
}

fn train<T: Numeric + Float>(config: &HarnessConfig, args: &Args) -> anyhow::Result<()> {
    let device = *config.devices.first().context("no devices configured")?;
    let mut rngs = seed_everything(&config.seed_context());
    let rng = rngs.rng(device).context("device was not seeded")?;

    let mut model = Linear::<T>::init(TRUE_WEIGHTS.len(), TRUE_BIAS.len(), rng)?;
    let train_set = synthetic_batches::<T, _>(rng, args.batches, args.batch_size)?;
    let val_set = synthetic_batches::<T, _>(rng, 2, args.batch_size)?;
    let lr: T = cast(config.learning_rate)?;
    tracing::info!(
        %device,
        dtype = %config.dtype,
        parameters = model.num_parameters(),
        "built model"
    );

    let mut last_val = None;
    for epoch in 0..config.epochs {
        run_epoch(&mut model, Stage::Train, epoch, &train_set, |m, output| {
            if let Some(grads) = &output.grads {
                sgd_step(m.parameters(), grads, lr)?;
            }
            Ok(())
        })?;
        let summary = run_epoch(&mut model, Stage::Validation, epoch, &val_set, |_, _| Ok(()))?;
        last_val = summary.mean_loss;
    }

    let weights = model.weights().to_vec();
    println!("weights: {weights:?}");
    println!("bias: {:?}", model.bias().to_vec());
    match last_val {
        Some(loss) => println!("final validation loss: {loss:.6}"),
        None => println!("no epochs were run"),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => HarnessConfig::default(),
    };
    if let Some(path) = &args.save_config {
        config
            .save(path)
            .with_context(|| format!("saving config to {}", path.display()))?;
    }

    match config.dtype {
        DType::F32 => train::<f32>(&config, &args),
        DType::F64 => train::<f64>(&config, &args),
        other => anyhow::bail!("cannot train in {other}"),
    }
}
