//! Scalar reverse-mode automatic differentiation.
//!
//! [`engine::Value`] is a node in a dynamically built computation graph:
//! arithmetic on values records the producing operation, and
//! [`engine::Value::backward`] walks the graph in reverse topological order
//! to compute exact gradients via the chain rule. On top of the engine sit
//! a small feed-forward layer ([`nn`]) and gradient-descent optimizers
//! ([`optim`]).
//!
//! ```
//! use scalargrad::{Tanh, Value};
//!
//! let a = Value::new(0.5);
//! let b = Value::new(-1.0);
//! let y = (a.clone() * b.clone() + 2.0).tanh();
//! y.backward();
//!
//! assert!(a.grad() != 0.0 && b.grad() != 0.0);
//! ```

pub mod engine;
pub mod error;
pub mod nn;
pub mod optim;

pub use engine::{Exp, LeakyRelu, Pow, Powf, Relu, Sigmoid, Tanh, Value};
pub use error::GradError;
pub use nn::{Activation, Layer, Mlp, Neuron, Parameters};
pub use optim::{Optimizer, Sgd};
