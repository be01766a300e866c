use std::str::FromStr;

use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::{
    engine::{LeakyRelu, Relu, Sigmoid, Tanh, Value},
    error::GradError,
};

/// Nonlinearity applied to a neuron's pre-activation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    Tanh,
    Relu,
    Sigmoid,
    LeakyRelu,
    /// Pass-through, typically for output layers of regression networks.
    Identity,
}

impl Activation {
    fn apply(&self, x: Value) -> Value {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Relu => x.relu(),
            Activation::Sigmoid => x.sigmoid(),
            Activation::LeakyRelu => x.leaky_relu(),
            Activation::Identity => x,
        }
    }
}

impl FromStr for Activation {
    type Err = GradError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tanh" => Ok(Activation::Tanh),
            "relu" => Ok(Activation::Relu),
            "sigmoid" => Ok(Activation::Sigmoid),
            "leaky_relu" => Ok(Activation::LeakyRelu),
            "identity" | "none" => Ok(Activation::Identity),
            other => Err(GradError::UnknownActivation(other.to_string())),
        }
    }
}

pub trait Parameters {
    /// Returns handles to every weight and bias, in stable order: layer,
    /// then neuron, then weights before bias.
    fn parameters(&self) -> Vec<Value>;

    /// Sets all gradients of the parameters to zero
    fn zero_grad(&self) {
        self.parameters().iter().for_each(|p| p.set_grad(0.0));
    }
}

pub struct Neuron {
    weights: Vec<Value>,
    bias: Value,
    activation: Activation,
}

impl Neuron {
    /// Creates a new [`Neuron`] with `nin` inputs, weights and bias sampled
    /// from Uniform[-1, 1). The generator is threaded in explicitly so
    /// initialization is reproducible from a seed.
    pub fn new<R: Rng + ?Sized>(nin: usize, activation: Activation, rng: &mut R) -> Self {
        let die: Uniform<f64> = Uniform::new(-1.0, 1.0)
            .expect("Failed to create uniform distribution: invalid range");

        Self {
            weights: (0..nin).map(|_| Value::new(die.sample(rng))).collect(),
            bias: Value::new(die.sample(rng)),
            activation,
        }
    }

    /// Returns the dot product of inputs and weights plus bias, passed
    /// through the activation. `inputs.len()` must equal the neuron's width.
    pub fn forward(&self, inputs: &[Value]) -> Value {
        debug_assert_eq!(inputs.len(), self.weights.len());
        let raw = self
            .weights
            .iter()
            .cloned()
            .zip(inputs.iter().cloned())
            .map(|(wi, xi)| wi * xi)
            .sum::<Value>()
            + self.bias.clone();
        self.activation.apply(raw)
    }
}

impl Parameters for Neuron {
    /// Returns the tuneable knobs of the neuron: weights and bias
    fn parameters(&self) -> Vec<Value> {
        let mut params = self.weights.clone();
        params.push(self.bias.clone());
        params
    }
}

pub struct Layer {
    neurons: Vec<Neuron>,
}

impl Layer {
    /// Creates a new [`Layer`] of `nout` neurons, each with `nin` inputs
    /// (dimensionality) and the same activation.
    pub fn new<R: Rng + ?Sized>(
        nin: usize,
        nout: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        Self {
            neurons: (0..nout)
                .map(|_| Neuron::new(nin, activation, rng))
                .collect(),
        }
    }

    /// One output node per neuron, always a `Vec` even for a single neuron.
    pub fn forward(&self, inputs: &[Value]) -> Vec<Value> {
        self.neurons.iter().map(|n| n.forward(inputs)).collect()
    }
}

impl Parameters for Layer {
    /// Returns the parameters of all neurons
    fn parameters(&self) -> Vec<Value> {
        self.neurons.iter().flat_map(|n| n.parameters()).collect()
    }
}

pub struct Mlp {
    layers: Vec<Layer>,
}

impl Mlp {
    /// Creates a new [`Mlp`] with `nin` inputs and `nouts` as the number of
    /// neurons in each subsequent layer. Hidden layers use `hidden`, the
    /// final layer uses `output`.
    ///
    /// Invariant: number of neurons in layer n == input dim of layer n+1
    pub fn new<R: Rng + ?Sized>(
        nin: usize,
        nouts: &[usize],
        hidden: Activation,
        output: Activation,
        rng: &mut R,
    ) -> Self {
        let sz = std::iter::once(nin)
            .chain(nouts.iter().copied())
            .collect::<Vec<_>>();
        Self {
            layers: (0..nouts.len())
                .map(|i| {
                    let act = if i + 1 == nouts.len() { output } else { hidden };
                    Layer::new(sz[i], sz[i + 1], act, rng)
                })
                .collect(),
        }
    }

    /// Threads the input nodes through each layer in order. The same node
    /// handles flow end to end, so a later `backward()` reaches every
    /// weight in every layer.
    pub fn forward(&self, inputs: &[Value]) -> Vec<Value> {
        let mut x = inputs.to_vec();
        for layer in &self.layers {
            x = layer.forward(&x);
        }
        x
    }
}

impl Parameters for Mlp {
    /// Returns the parameters of all layers
    fn parameters(&self) -> Vec<Value> {
        self.layers.iter().flat_map(|l| l.parameters()).collect()
    }
}
