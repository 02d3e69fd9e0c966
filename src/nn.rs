//! Small dense network used by the DQN policies.
//!
//! A multilayer perceptron over `ndarray` with a configurable hidden
//! activation, a linear output layer, mean-squared error on selected
//! outputs and three optimizers. Parameters and optimizer moments are
//! serde-serializable so policies can be saved and restored.

use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

const RMSPROP_RHO: f64 = 0.9;
const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Relu,
    Tanh,
    Sigmoid,
    Linear,
}

impl Activation {
    fn apply(self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => z.mapv(|x| x.max(0.0)),
            Activation::Tanh => z.mapv(f64::tanh),
            Activation::Sigmoid => z.mapv(sigmoid),
            Activation::Linear => z.clone(),
        }
    }

    /// Derivative with respect to the pre-activation `z`.
    fn derivative(self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => z.mapv(|x| if x > 0.0 { 1.0 } else { 0.0 }),
            Activation::Tanh => z.mapv(|x| 1.0 - x.tanh().powi(2)),
            Activation::Sigmoid => z.mapv(|x| {
                let s = sigmoid(x);
                s * (1.0 - s)
            }),
            Activation::Linear => Array2::ones(z.raw_dim()),
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl std::str::FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relu" => Ok(Activation::Relu),
            "tanh" => Ok(Activation::Tanh),
            "sigmoid" => Ok(Activation::Sigmoid),
            "linear" => Ok(Activation::Linear),
            other => Err(format!("unknown activation '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Sgd,
    Adam,
    RmsProp,
}

impl std::str::FromStr for OptimizerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sgd" => Ok(OptimizerKind::Sgd),
            "adam" => Ok(OptimizerKind::Adam),
            "rmsprop" => Ok(OptimizerKind::RmsProp),
            other => Err(format!("unknown optimizer '{}'", other)),
        }
    }
}

/// Per-parameter optimizer moments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Moments {
    first_w: Vec<Array2<f64>>,
    second_w: Vec<Array2<f64>>,
    first_b: Vec<Array1<f64>>,
    second_b: Vec<Array1<f64>>,
    step: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    /// `weights[l]` has shape `(inputs, outputs)` of layer `l`.
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    activation: Activation,
    optimizer: OptimizerKind,
    learning_rate: f64,
    moments: Moments,
}

struct Gradients {
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
}

impl Gradients {
    fn all_finite(&self) -> bool {
        self.weights.iter().all(|g| g.iter().all(|x| x.is_finite()))
            && self.biases.iter().all(|g| g.iter().all(|x| x.is_finite()))
    }
}

impl Mlp {
    /// Xavier-uniform initialised network `input → hidden… → output`.
    pub fn new(
        input: usize,
        hidden: &[usize],
        output: usize,
        activation: Activation,
        optimizer: OptimizerKind,
        learning_rate: f64,
        rng: &mut impl Rng,
    ) -> Self {
        let mut sizes = Vec::with_capacity(hidden.len() + 2);
        sizes.push(input);
        sizes.extend_from_slice(hidden);
        sizes.push(output);

        let mut weights = Vec::new();
        let mut biases = Vec::new();
        for pair in sizes.windows(2) {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            let limit = (6.0 / (fan_in + fan_out).max(1) as f64).sqrt();
            weights.push(Array2::from_shape_fn((fan_in, fan_out), |_| {
                rng.gen_range(-limit..limit)
            }));
            biases.push(Array1::zeros(fan_out));
        }

        let moments = Moments {
            first_w: weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect(),
            second_w: weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect(),
            first_b: biases.iter().map(|b| Array1::zeros(b.raw_dim())).collect(),
            second_b: biases.iter().map(|b| Array1::zeros(b.raw_dim())).collect(),
            step: 0,
        };

        Mlp {
            weights,
            biases,
            activation,
            optimizer,
            learning_rate,
            moments,
        }
    }

    pub fn input_len(&self) -> usize {
        self.weights.first().map_or(0, |w| w.nrows())
    }

    pub fn output_len(&self) -> usize {
        self.weights.last().map_or(0, |w| w.ncols())
    }

    /// Layer-by-layer pre-activations and activations for a batch.
    fn forward_trace(&self, x: &Array2<f64>) -> (Vec<Array2<f64>>, Vec<Array2<f64>>) {
        let last = self.weights.len() - 1;
        let mut zs = Vec::with_capacity(self.weights.len());
        let mut acts = vec![x.clone()];
        for (l, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let z = acts[l].dot(w) + b;
            let a = if l == last {
                z.clone()
            } else {
                self.activation.apply(&z)
            };
            zs.push(z);
            acts.push(a);
        }
        (zs, acts)
    }

    /// Outputs for a batch of row inputs.
    pub fn forward_batch(&self, x: &Array2<f64>) -> Array2<f64> {
        let (_, mut acts) = self.forward_trace(x);
        acts.pop().unwrap_or_else(|| x.clone())
    }

    /// Outputs for a single input.
    pub fn forward(&self, x: &[f64]) -> Array1<f64> {
        let row = Array2::from_shape_vec((1, x.len()), x.to_vec())
            .unwrap_or_else(|_| Array2::zeros((1, self.input_len())));
        self.forward_batch(&row).row(0).to_owned()
    }

    /// One optimizer step on the MSE between `outputs[i, selected[i]]` and
    /// `targets[i]`.
    ///
    /// Returns the pre-step loss, or `None` without touching any parameter
    /// if the loss or a gradient is not finite.
    pub fn train(&mut self, x: &Array2<f64>, selected: &[usize], targets: &[f64]) -> Option<f64> {
        let batch = x.nrows();
        if batch == 0 || selected.len() != batch || targets.len() != batch {
            return None;
        }
        let (zs, acts) = self.forward_trace(x);
        let out = acts.last()?;

        let mut delta = Array2::<f64>::zeros(out.raw_dim());
        let mut loss = 0.0;
        for i in 0..batch {
            let err = out[[i, selected[i]]] - targets[i];
            loss += err * err;
            delta[[i, selected[i]]] = 2.0 * err / batch as f64;
        }
        loss /= batch as f64;
        if !loss.is_finite() {
            return None;
        }

        let layers = self.weights.len();
        let mut grads = Gradients {
            weights: Vec::with_capacity(layers),
            biases: Vec::with_capacity(layers),
        };
        for l in (0..layers).rev() {
            grads.weights.push(acts[l].t().dot(&delta));
            grads.biases.push(delta.sum_axis(Axis(0)));
            if l > 0 {
                delta = delta.dot(&self.weights[l].t()) * self.activation.derivative(&zs[l - 1]);
            }
        }
        grads.weights.reverse();
        grads.biases.reverse();

        if !grads.all_finite() {
            return None;
        }
        self.apply(grads);
        Some(loss)
    }

    fn apply(&mut self, grads: Gradients) {
        let lr = self.learning_rate;
        let m = &mut self.moments;
        m.step += 1;
        let t = m.step as i32;

        for (l, g) in grads.weights.iter().enumerate() {
            let update = step(
                self.optimizer,
                g,
                &mut m.first_w[l],
                &mut m.second_w[l],
                lr,
                t,
            );
            self.weights[l] -= &update;
        }
        for (l, g) in grads.biases.iter().enumerate() {
            let update = step(
                self.optimizer,
                g,
                &mut m.first_b[l],
                &mut m.second_b[l],
                lr,
                t,
            );
            self.biases[l] -= &update;
        }
    }
}

/// Parameter delta for one tensor; moments are updated in place.
fn step<D: ndarray::Dimension>(
    kind: OptimizerKind,
    g: &ndarray::Array<f64, D>,
    first: &mut ndarray::Array<f64, D>,
    second: &mut ndarray::Array<f64, D>,
    lr: f64,
    t: i32,
) -> ndarray::Array<f64, D> {
    match kind {
        OptimizerKind::Sgd => g * lr,
        OptimizerKind::RmsProp => {
            *second = &*second * RMSPROP_RHO + &g.mapv(|x| x * x) * (1.0 - RMSPROP_RHO);
            let denom = second.mapv(|s| s.sqrt() + EPSILON);
            g * lr / denom
        }
        OptimizerKind::Adam => {
            *first = &*first * ADAM_BETA1 + g * (1.0 - ADAM_BETA1);
            *second = &*second * ADAM_BETA2 + &g.mapv(|x| x * x) * (1.0 - ADAM_BETA2);
            let m_hat = &*first / (1.0 - ADAM_BETA1.powi(t));
            let v_hat = second.mapv(|v| (v / (1.0 - ADAM_BETA2.powi(t))).sqrt() + EPSILON);
            m_hat * lr / v_hat
        }
    }
}
