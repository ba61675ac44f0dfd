//! Training loop over the toy dataset.

use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::TrainConfig;
use crate::engine::{Value, ValueType};
use crate::error::Result;
use crate::nn::{mse_loss, Activation, Module, MLP};

pub const INPUTS: [[ValueType; 3]; 4] = [
    [2.0, 3.0, -1.0],
    [3.0, -1.0, 0.5],
    [0.5, 1.0, 1.0],
    [1.0, 1.0, -1.0],
];

pub const TARGETS: [ValueType; 4] = [1.0, -1.0, -1.0, 1.0];

#[derive(Debug, Clone)]
pub struct TrainReport {
    pub losses: Vec<ValueType>,
    pub predictions: Vec<ValueType>,
}

fn forward(mlp: &MLP) -> Result<(Value, Vec<Value>)> {
    let preds = INPUTS
        .iter()
        .map(|x| -> Result<Value> {
            let x = x.iter().copied().map(Value::new).collect::<Vec<_>>();
            Ok(mlp.run(&x)?.swap_remove(0))
        })
        .collect::<Result<Vec<_>>>()?;
    let loss = mse_loss(&preds, &TARGETS)?;

    Ok((loss, preds))
}

/// Runs `config.steps` rounds of forward, zero-grad, backward and update.
/// `on_step` sees the step index and the loss before that step's update.
pub fn train<F>(config: &TrainConfig, mut on_step: F) -> Result<TrainReport>
where
    F: FnMut(usize, ValueType),
{
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mlp = MLP::new(&mut rng, INPUTS[0].len(), &config.layers, Activation::Tanh)?;
    debug!("training {} with {} parameters", mlp, mlp.parameters().len());

    let mut losses = Vec::with_capacity(config.steps);
    for step in 0..config.steps {
        let (loss, _) = forward(&mlp)?;
        mlp.zero_grad();
        loss.backward();
        mlp.step(config.learning_rate);

        on_step(step, loss.data());
        losses.push(loss.data());
    }

    let (_, preds) = forward(&mlp)?;
    Ok(TrainReport {
        losses,
        predictions: preds.iter().map(Value::data).collect(),
    })
}
