//! SPICE engineering-unit suffixes.
//!
//! A SPICE numeric literal is a number followed by an optional scale letter
//! and an arbitrary trailing unit word that carries no meaning (`10Volts`
//! is the number 10, `100nF` is 100e-9 with the unit word "F").

use std::fmt;

/// Scale suffix of a SPICE numeric literal.
///
/// `meg` and `mil` are the only multi-letter scales; everything is
/// case-insensitive, so `M` means milli, never mega.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scale {
    Tera,
    Giga,
    Mega,
    Kilo,
    Mil,
    Milli,
    Micro,
    Nano,
    Pico,
    Femto,
}

impl Scale {
    /// All scales with a single canonical suffix, largest first.
    pub const ALL: [Scale; 10] = [
        Scale::Tera,
        Scale::Giga,
        Scale::Mega,
        Scale::Kilo,
        Scale::Mil,
        Scale::Milli,
        Scale::Micro,
        Scale::Nano,
        Scale::Pico,
        Scale::Femto,
    ];

    /// Multiplier applied to the numeric part.
    pub fn multiplier(self) -> f64 {
        match self {
            Scale::Tera => 1e12,
            Scale::Giga => 1e9,
            Scale::Mega => 1e6,
            Scale::Kilo => 1e3,
            Scale::Mil => 25.4e-6,
            Scale::Milli => 1e-3,
            Scale::Micro => 1e-6,
            Scale::Nano => 1e-9,
            Scale::Pico => 1e-12,
            Scale::Femto => 1e-15,
        }
    }

    /// Canonical lower-case suffix.
    pub fn suffix(self) -> &'static str {
        match self {
            Scale::Tera => "t",
            Scale::Giga => "g",
            Scale::Mega => "meg",
            Scale::Kilo => "k",
            Scale::Mil => "mil",
            Scale::Milli => "m",
            Scale::Micro => "u",
            Scale::Nano => "n",
            Scale::Pico => "p",
            Scale::Femto => "f",
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Split a run of trailing letters into a scale and the ignored unit word.
///
/// `kohm` is (kilo, "ohm"), `MEGohm` is (mega, "ohm"), `Volts` is
/// (no scale, "Volts"). The unit word is recorded by callers but never
/// interpreted.
pub fn split_suffix(letters: &str) -> (Option<Scale>, &str) {
    let lower = letters.to_ascii_lowercase();
    if lower.starts_with("meg") {
        return (Some(Scale::Mega), &letters[3..]);
    }
    if lower.starts_with("mil") {
        return (Some(Scale::Mil), &letters[3..]);
    }
    let scale = match lower.as_bytes().first() {
        Some(b't') => Some(Scale::Tera),
        Some(b'g') => Some(Scale::Giga),
        Some(b'k') => Some(Scale::Kilo),
        Some(b'm') => Some(Scale::Milli),
        Some(b'u') => Some(Scale::Micro),
        Some(b'n') => Some(Scale::Nano),
        Some(b'p') => Some(Scale::Pico),
        Some(b'f') => Some(Scale::Femto),
        _ => None,
    };
    match scale {
        Some(s) => (Some(s), &letters[1..]),
        None => (None, letters),
    }
}

/// Parse a SPICE-style value with optional scale suffix and unit word.
pub fn parse_value(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<f64>() {
        return Some(v);
    }

    let num_end = s
        .find(|c: char| c.is_ascii_alphabetic() && c != 'e' && c != 'E')
        .unwrap_or(s.len());
    // An exponent letter with nothing after it ("1e") is not a number.
    let (num_str, letters) = s.split_at(num_end);
    let value: f64 = num_str.parse().ok()?;

    let (scale, _unit) = split_suffix(letters);
    match scale {
        Some(scale) => Some(value * scale.multiplier()),
        None => Some(value),
    }
}

/// Format a value with its canonical SPICE suffix.
///
/// The scaled mantissa is printed with Rust's shortest round-tripping
/// decimal representation, so `1500.0` renders as `1.5k` and `1e-9` as
/// `1n`. Values with no canonical prefix (including zero) render plain.
pub fn format_value(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return format_number(value);
    }
    let abs = value.abs();

    let scale = if abs >= 1e12 {
        Some(Scale::Tera)
    } else if abs >= 1e9 {
        Some(Scale::Giga)
    } else if abs >= 1e6 {
        Some(Scale::Mega)
    } else if abs >= 1e3 {
        Some(Scale::Kilo)
    } else if abs >= 1.0 {
        None
    } else if abs >= 1e-3 {
        Some(Scale::Milli)
    } else if abs >= 1e-6 {
        Some(Scale::Micro)
    } else if abs >= 1e-9 {
        Some(Scale::Nano)
    } else if abs >= 1e-12 {
        Some(Scale::Pico)
    } else if abs >= 1e-15 {
        Some(Scale::Femto)
    } else {
        None
    };

    match scale {
        Some(scale) => {
            let scaled = value / scale.multiplier();
            format!("{}{}", format_number(scaled), scale.suffix())
        }
        None => format_number(value),
    }
}

/// Shortest decimal form of a float, without a trailing `.0` on integers.
pub fn format_number(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
