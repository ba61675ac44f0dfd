use crate::engine::*;
use crate::error::{Error, Result};
use itertools::Itertools;
use log::debug;
use rand::prelude::*;
use rand::rngs::StdRng;

pub trait Module {
    fn zero_grad(&self) {
        self.parameters().iter().for_each(|v| v.reset_grad())
    }

    fn parameters(&self) -> Vec<Value>;

    /// Plain gradient descent: `value -= learning_rate * grad` on every parameter.
    fn step(&self, learning_rate: ValueType) {
        let params = self.parameters();
        debug!("step over {} parameters, lr={}", params.len(), learning_rate);
        params
            .iter()
            .for_each(|p| p.set_data(p.data() - learning_rate * p.grad()))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Activation {
    #[default]
    Tanh,
    Relu,
    Linear,
}

impl Activation {
    fn apply(&self, v: Value) -> Value {
        match self {
            Activation::Tanh => v.tanh(),
            Activation::Relu => v.relu(),
            Activation::Linear => v,
        }
    }
}

pub struct Neuron {
    w: Vec<Value>,
    b: Value,
    activation: Activation,
}

impl Neuron {
    pub fn new(rng: &mut StdRng, nin: usize, activation: Activation) -> Self {
        let w = (0..nin)
            .map(|i| Value::new(rng.gen_range(-1.0..1.0)).labeled(&format!("w[{i}]")))
            .collect();
        let b = Value::new(rng.gen_range(-1.0..1.0)).labeled("b");
        Self { w, b, activation }
    }

    pub fn run(&self, x: &[Value]) -> Result<Value> {
        if x.len() != self.w.len() {
            return Err(Error::DimensionMismatch {
                expected: self.w.len(),
                got: x.len(),
            });
        }

        let sum: Value = self
            .w
            .iter()
            .zip_eq(x)
            .map(|(wi, xi)| wi * xi)
            .sum();

        Ok(self.activation.apply(sum + &self.b))
    }
}

impl Module for Neuron {
    fn parameters(&self) -> Vec<Value> {
        let mut params = self.w.clone();
        params.push(self.b.clone());

        params
    }
}

impl std::fmt::Display for Neuron {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "{}Neuron({})",
            match self.activation {
                Activation::Tanh => "Tanh",
                Activation::Relu => "ReLU",
                Activation::Linear => "Linear",
            },
            self.w.len()
        ))
    }
}

pub struct Layer {
    neurons: Vec<Neuron>,
}

impl Layer {
    pub fn new(rng: &mut StdRng, nin: usize, nout: usize, activation: Activation) -> Self {
        let neurons = (0..nout)
            .map(|_| Neuron::new(rng, nin, activation))
            .collect();

        Self { neurons }
    }

    pub fn run(&self, x: &[Value]) -> Result<Vec<Value>> {
        self.neurons.iter().map(|n| n.run(x)).collect()
    }
}

impl Module for Layer {
    fn parameters(&self) -> Vec<Value> {
        self.neurons.iter().flat_map(|x| x.parameters()).collect()
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Layer of [{}]", self.neurons.iter().join(", ")))
    }
}

pub struct MLP {
    layers: Vec<Layer>,
}

impl MLP {
    /// Hidden layers use `hidden`; the output layer is linear.
    pub fn new(rng: &mut StdRng, nin: usize, nouts: &[usize], hidden: Activation) -> Result<Self> {
        if nouts.is_empty() {
            return Err(Error::EmptyNetwork);
        }

        let sizes = std::iter::once(nin).chain(nouts.iter().copied()).collect::<Vec<_>>();
        let layers = sizes
            .iter()
            .tuple_windows()
            .enumerate()
            .map(|(n, (&nin, &nout))| {
                let activation = if n == nouts.len() - 1 {
                    Activation::Linear
                } else {
                    hidden
                };
                Layer::new(rng, nin, nout, activation)
            })
            .collect::<Vec<_>>();
        debug!("built MLP {:?} with {} layers", sizes, layers.len());

        Ok(Self { layers })
    }

    pub fn run(&self, x: &[Value]) -> Result<Vec<Value>> {
        let mut x = x.to_vec();
        for layer in &self.layers {
            x = layer.run(&x)?;
        }

        Ok(x)
    }
}

impl Module for MLP {
    fn parameters(&self) -> Vec<Value> {
        self.layers.iter().flat_map(|x| x.parameters()).collect()
    }
}

impl std::fmt::Display for MLP {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("MLP of [{}]", self.layers.iter().join(", ")))
    }
}

/// Sum of squared errors between predictions and targets.
pub fn mse_loss(predictions: &[Value], targets: &[ValueType]) -> Result<Value> {
    if predictions.len() != targets.len() {
        return Err(Error::DimensionMismatch {
            expected: targets.len(),
            got: predictions.len(),
        });
    }

    Ok(predictions
        .iter()
        .zip_eq(targets)
        .map(|(p, &t)| (p - t).pow(2.))
        .sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn inputs(xs: &[ValueType]) -> Vec<Value> {
        xs.iter().copied().map(Value::new).collect()
    }

    #[test]
    fn neuron_parameters_are_labeled_and_bounded() {
        let n = Neuron::new(&mut rng(), 3, Activation::Tanh);
        let params = n.parameters();

        assert_eq!(params.len(), 4);
        assert_eq!(params[0].label().as_deref(), Some("w[0]"));
        assert_eq!(params[2].label().as_deref(), Some("w[2]"));
        assert_eq!(params[3].label().as_deref(), Some("b"));
        assert!(params.iter().all(|p| (-1.0..1.0).contains(&p.data())));
        assert_eq!(n.to_string(), "TanhNeuron(3)");
    }

    #[test]
    fn neuron_rejects_wrong_input_size() {
        let n = Neuron::new(&mut rng(), 3, Activation::Linear);
        let err = n.run(&inputs(&[1.0, 2.0])).unwrap_err();

        assert_eq!(err, Error::DimensionMismatch { expected: 3, got: 2 });
    }

    #[test]
    fn linear_neuron_is_dot_plus_bias() {
        let n = Neuron::new(&mut rng(), 2, Activation::Linear);
        let p = n.parameters();
        let out = n.run(&inputs(&[2.0, -1.0])).unwrap();

        let expected = p[0].data() * 2.0 - p[1].data() + p[2].data();
        assert_float_eq!(out.data(), expected, abs <= 1e-12);

        out.backward();
        assert_float_eq!(p[0].grad(), 2.0, abs <= 1e-12);
        assert_float_eq!(p[1].grad(), -1.0, abs <= 1e-12);
        assert_float_eq!(p[2].grad(), 1.0, abs <= 1e-12);
    }

    #[test]
    fn same_seed_same_network() {
        let a = MLP::new(&mut rng(), 3, &[4, 1], Activation::Tanh).unwrap();
        let b = MLP::new(&mut rng(), 3, &[4, 1], Activation::Tanh).unwrap();

        let pa = a.parameters().iter().map(Value::data).collect::<Vec<_>>();
        let pb = b.parameters().iter().map(Value::data).collect::<Vec<_>>();
        assert_eq!(pa, pb);
    }

    #[test]
    fn mlp_shape_and_display() {
        let mlp = MLP::new(&mut rng(), 3, &[4, 4, 1], Activation::Tanh).unwrap();

        assert_eq!(mlp.parameters().len(), 4 * 4 + 4 * 5 + 5);
        assert_eq!(mlp.run(&inputs(&[1.0, 2.0, 3.0])).unwrap().len(), 1);
        assert_eq!(
            mlp.to_string(),
            "MLP of [Layer of [TanhNeuron(3), TanhNeuron(3), TanhNeuron(3), TanhNeuron(3)], \
             Layer of [TanhNeuron(4), TanhNeuron(4), TanhNeuron(4), TanhNeuron(4)], \
             Layer of [LinearNeuron(4)]]"
        );
        assert!(matches!(
            MLP::new(&mut rng(), 3, &[], Activation::Tanh),
            Err(Error::EmptyNetwork)
        ));
    }

    #[test]
    fn zero_grad_and_step() {
        let n = Neuron::new(&mut rng(), 1, Activation::Linear);
        let before = n.parameters().iter().map(Value::data).collect::<Vec<_>>();
        n.run(&inputs(&[3.0])).unwrap().backward();
        n.step(0.1);

        let params = n.parameters();
        assert_float_eq!(params[0].data(), before[0] - 0.3, abs <= 1e-12);
        assert_float_eq!(params[1].data(), before[1] - 0.1, abs <= 1e-12);

        n.zero_grad();
        assert!(params.iter().all(|p| p.grad() == 0.));
    }

    #[test]
    fn mse_loss_sums_squares() {
        let preds = inputs(&[1.0, -2.0]);
        let loss = mse_loss(&preds, &[0.5, 1.0]).unwrap();
        loss.backward();

        assert_float_eq!(loss.data(), 0.25 + 9.0, abs <= 1e-12);
        assert_float_eq!(preds[0].grad(), 1.0, abs <= 1e-12);
        assert_float_eq!(preds[1].grad(), -6.0, abs <= 1e-12);
        assert!(mse_loss(&preds, &[1.0]).is_err());
    }

    #[test]
    fn training_reduces_loss() {
        let mut rng = rng();
        let mlp = MLP::new(&mut rng, 3, &[4, 4, 1], Activation::Tanh).unwrap();
        let xs = [
            [2.0, 3.0, -1.0],
            [3.0, -1.0, 0.5],
            [0.5, 1.0, 1.0],
            [1.0, 1.0, -1.0],
        ];
        let ys = [1.0, -1.0, -1.0, 1.0];

        let loss_of = |mlp: &MLP| {
            let preds = xs
                .iter()
                .map(|x| mlp.run(&inputs(x)).map(|out| out[0].clone()))
                .collect::<Result<Vec<_>>>()
                .unwrap();
            mse_loss(&preds, &ys).unwrap()
        };

        let initial = loss_of(&mlp).data();
        for _ in 0..50 {
            let loss = loss_of(&mlp);
            mlp.zero_grad();
            loss.backward();
            mlp.step(0.05);
        }
        let trained = loss_of(&mlp).data();

        assert!(trained < initial, "{trained} >= {initial}");
    }
}
