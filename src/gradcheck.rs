//! Finite-difference verification of analytic gradients.

use log::debug;

use crate::engine::{Value, ValueType};
use crate::error::{Error, Result};

pub const DEFAULT_EPSILON: ValueType = 1e-6;
pub const DEFAULT_TOLERANCE: ValueType = 1e-4;

/// Central-difference estimate of `d f / d inputs[i]` for every input.
pub fn numeric_grads<F>(f: F, inputs: &[ValueType], epsilon: ValueType) -> Vec<ValueType>
where
    F: Fn(&[Value]) -> Value,
{
    let eval = |xs: &[ValueType]| {
        let leaves = xs.iter().copied().map(Value::new).collect::<Vec<_>>();
        f(&leaves).data()
    };

    (0..inputs.len())
        .map(|i| {
            let mut plus = inputs.to_vec();
            let mut minus = inputs.to_vec();
            plus[i] += epsilon;
            minus[i] -= epsilon;
            (eval(&plus) - eval(&minus)) / (2. * epsilon)
        })
        .collect()
}

/// Builds `f` over fresh leaves holding `inputs`, back-propagates, and checks
/// each leaf gradient against [`numeric_grads`].
///
/// The error is relative to the larger magnitude of the two gradients, and
/// absolute once both are below 1. Returns the analytic gradients on success.
pub fn check_gradients<F>(
    f: F,
    inputs: &[ValueType],
    epsilon: ValueType,
    tolerance: ValueType,
) -> Result<Vec<ValueType>>
where
    F: Fn(&[Value]) -> Value,
{
    let leaves = inputs.iter().copied().map(Value::new).collect::<Vec<_>>();
    let out = f(&leaves);
    out.backward();
    let analytic = leaves.iter().map(Value::grad).collect::<Vec<_>>();
    let numeric = numeric_grads(&f, inputs, epsilon);

    for (input_index, (&a, &n)) in analytic.iter().zip(&numeric).enumerate() {
        let relative_error = (a - n).abs() / a.abs().max(n.abs()).max(1.);
        debug!("gradcheck input {input_index}: analytic={a} numeric={n} err={relative_error}");
        if !(relative_error <= tolerance) {
            return Err(Error::GradientMismatch {
                input_index,
                analytic: a,
                numeric: n,
                relative_error,
            });
        }
    }

    Ok(analytic)
}
