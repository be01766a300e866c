use thiserror::Error;

/// Errors surfaced by graph construction.
///
/// Every variant is a usage error: the engine is deterministic and
/// synchronous, so failures propagate immediately to the caller and are
/// never retried or caught internally.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GradError {
    /// `powf` with a negative base and a non-integer exponent has no real
    /// result.
    #[error("power of negative base {base} with non-integer exponent {exp} is undefined")]
    NegativeBaseNonIntegerExponent { base: f64, exp: f64 },

    /// `powf` of a zero base with a non-positive exponent.
    #[error("zero base raised to non-positive exponent {exp} is undefined")]
    ZeroBaseNonPositiveExponent { exp: f64 },

    /// `pow` with a graph-node exponent needs `ln(base)` for the exponent
    /// gradient, so the base must be non-negative.
    #[error("node-valued exponent requires a non-negative base, got {base}")]
    NegativeBaseNodeExponent { base: f64 },

    /// Activation name outside the supported set.
    #[error("unknown activation `{0}` (expected tanh, relu, sigmoid or leaky_relu)")]
    UnknownActivation(String),
}
