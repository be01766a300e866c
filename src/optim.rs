use log::debug;

use crate::engine::Value;

/// Two-operation contract every optimizer follows: `step` applies the
/// parameter update from the gradients currently held, `zero_grad` flushes
/// them. `zero_grad` must run between training steps, or gradients from the
/// previous step silently accumulate into the next one.
pub trait Optimizer {
    fn step(&mut self);
    fn zero_grad(&self);
}

/// Stochastic gradient descent over an externally supplied parameter
/// collection, optionally with momentum.
pub struct Sgd {
    params: Vec<Value>,
    lr: f64,
    momentum: f64,
    /// One persistent velocity per parameter; unused when momentum is 0.
    velocities: Vec<f64>,
}

impl Sgd {
    /// Plain SGD: `data += -lr * grad` per step.
    pub fn new(params: Vec<Value>, lr: f64) -> Self {
        Self::with_momentum(params, lr, 0.0)
    }

    /// SGD with momentum: `v = momentum * v - lr * grad; data += v`.
    pub fn with_momentum(params: Vec<Value>, lr: f64, momentum: f64) -> Self {
        let velocities = vec![0.0; params.len()];
        Self {
            params,
            lr,
            momentum,
            velocities,
        }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self) {
        debug!(
            "sgd step: lr={}, momentum={}, params={}",
            self.lr,
            self.momentum,
            self.params.len()
        );
        for (p, v) in self.params.iter().zip(self.velocities.iter_mut()) {
            if self.momentum == 0.0 {
                p.increase_data(-self.lr * p.grad());
            } else {
                *v = self.momentum * *v - self.lr * p.grad();
                p.increase_data(*v);
            }
        }
    }

    fn zero_grad(&self) {
        self.params.iter().for_each(|p| p.set_grad(0.0));
    }
}
