//! Built-in expression functions.

use num_complex::Complex64;
use rand::Rng;
use rand::rngs::StdRng;

use super::eval::{EvalError, Value};

/// Expected argument count for a function, `(min, max)`.
///
/// Returns `None` for names that are not built-in functions.
pub fn arity(name: &str) -> Option<(usize, usize)> {
    let n = match name {
        "sin" | "cos" | "tan" | "asin" | "acos" | "atan" | "sinh" | "cosh" | "tanh" | "asinh"
        | "acosh" | "atanh" | "exp" | "ln" | "log" | "log10" | "sqrt" | "abs" | "sgn" | "sign"
        | "int" | "nint" | "ceil" | "floor" | "db" | "re" | "img" | "ph" | "u" | "stp"
        | "uramp" | "ddt" | "sdt" => (1, 1),
        "atan2" | "pow" | "pwr" | "pwrs" | "unif" | "aunif" | "ddx" => (2, 2),
        "if" | "limit" | "gauss" | "agauss" => (3, 3),
        "min" | "max" => (1, usize::MAX),
        "rand" => (0, 0),
        _ => return None,
    };
    Some(n)
}

/// Functions that stay symbolic: they only mean something to the
/// simulator's time-domain engine.
pub fn is_deferred(name: &str) -> bool {
    matches!(name, "ddt" | "sdt" | "ddx")
}

/// Evaluate a built-in function over already-evaluated arguments.
///
/// The RNG is the caller's random source; each call to a randomized form
/// draws from it exactly once and the result is never cached.
pub fn apply(name: &str, args: &[Value], rng: &mut StdRng) -> Result<Value, EvalError> {
    let (min, max) = arity(name).ok_or_else(|| EvalError::UnknownFunction {
        name: name.to_string(),
    })?;
    if args.len() < min || args.len() > max {
        return Err(EvalError::ArityMismatch {
            function: name.to_string(),
            expected: min,
            got: args.len(),
        });
    }

    // The complex-aware functions pick the argument apart themselves.
    match name {
        "re" => return Ok(Value::Real(args[0].complex().re)),
        "img" => return Ok(Value::Real(args[0].complex().im)),
        "ph" => return Ok(Value::Real(args[0].complex().arg())),
        "abs" => {
            return Ok(match args[0] {
                Value::Real(x) => Value::Real(x.abs()),
                Value::Complex(c) => Value::Real(c.norm()),
            });
        }
        "sqrt" => {
            return Ok(match args[0] {
                Value::Real(x) if x >= 0.0 => Value::Real(x.sqrt()),
                Value::Real(x) => Value::Complex(Complex64::new(x, 0.0).sqrt()),
                Value::Complex(c) => Value::Complex(c.sqrt()),
            });
        }
        _ => {}
    }

    let x = |i: usize| args[i].real();

    let result = match name {
        "sin" => x(0).sin(),
        "cos" => x(0).cos(),
        "tan" => x(0).tan(),
        "asin" => x(0).asin(),
        "acos" => x(0).acos(),
        "atan" => x(0).atan(),
        "atan2" => x(0).atan2(x(1)),
        "sinh" => x(0).sinh(),
        "cosh" => x(0).cosh(),
        "tanh" => x(0).tanh(),
        "asinh" => x(0).asinh(),
        "acosh" => x(0).acosh(),
        "atanh" => x(0).atanh(),
        "exp" => x(0).exp(),
        "ln" | "log" => x(0).ln(),
        "log10" => x(0).log10(),
        "db" => 20.0 * x(0).abs().log10(),
        "pow" => x(0).powf(x(1)),
        "pwr" => x(0).abs().powf(x(1)),
        "pwrs" => x(0).signum() * x(0).abs().powf(x(1)),
        "sgn" | "sign" => {
            let v = x(0);
            if v > 0.0 {
                1.0
            } else if v < 0.0 {
                -1.0
            } else {
                0.0
            }
        }
        "int" => x(0).trunc(),
        "nint" => x(0).round(),
        "ceil" => x(0).ceil(),
        "floor" => x(0).floor(),
        "u" | "stp" => {
            if x(0) >= 0.0 {
                1.0
            } else {
                0.0
            }
        }
        "uramp" => x(0).max(0.0),
        "min" => args.iter().map(|v| v.real()).fold(f64::INFINITY, f64::min),
        "max" => args
            .iter()
            .map(|v| v.real())
            .fold(f64::NEG_INFINITY, f64::max),
        "limit" => x(0).clamp(x(1), x(2)),
        "if" => {
            if x(0) != 0.0 {
                x(1)
            } else {
                x(2)
            }
        }
        // Randomized forms: gauss/agauss spread a nominal by a relative or
        // absolute n-sigma tolerance, unif/aunif draw uniformly.
        "gauss" => sample_normal(rng, x(0), x(0).abs() * x(1) / x(2)),
        "agauss" => sample_normal(rng, x(0), x(1) / x(2)),
        "unif" => {
            let (mu, alpha) = (x(0), x(1));
            rng.gen_range_f64(mu * (1.0 - alpha), mu * (1.0 + alpha))
        }
        "aunif" => {
            let (mu, alpha) = (x(0), x(1));
            rng.gen_range_f64(mu - alpha, mu + alpha)
        }
        "rand" => rng.r#gen::<f64>(),
        // Time-domain forms are kept residual by the evaluator; a direct
        // call sees a constant, whose derivative/integral is zero.
        "ddt" | "sdt" | "ddx" => 0.0,
        _ => unreachable!("arity() admitted unknown function {name}"),
    };
    Ok(Value::Real(result))
}

/// Box-Muller normal sample.
fn sample_normal(rng: &mut StdRng, mean: f64, sigma: f64) -> f64 {
    let u1: f64 = rng.r#gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.r#gen();
    let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
    mean + sigma * z
}

trait GenRange {
    fn gen_range_f64(&mut self, lo: f64, hi: f64) -> f64;
}

impl GenRange for StdRng {
    fn gen_range_f64(&mut self, lo: f64, hi: f64) -> f64 {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        if lo == hi {
            return lo;
        }
        lo + self.r#gen::<f64>() * (hi - lo)
    }
}
