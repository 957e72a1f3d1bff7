//! ASCII rawfile decoding.
//!
//! The simulator hands results back as an ngspice rawfile; only the
//! ASCII variant is decoded here since the runner always asks for it.

use crate::error::{Error, Result};

/// Decoded simulation results: one column of values per variable.
#[derive(Debug, Clone, Default)]
pub struct RawResults {
    pub plotname: String,
    pub variables: Vec<String>,
    /// `columns[i]` belongs to `variables[i]`. Complex values keep
    /// their real part; SPICE operating points and transients are real.
    pub columns: Vec<Vec<f64>>,
}

impl RawResults {
    /// Column for a variable name (`v(2)`, `time`), case-insensitive.
    pub fn vector(&self, name: &str) -> Option<&[f64]> {
        let index = self
            .variables
            .iter()
            .position(|v| v.eq_ignore_ascii_case(name))?;
        Some(&self.columns[index])
    }

    pub fn num_points(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }
}

/// Decode an ASCII rawfile.
pub fn parse_rawfile(text: &str) -> Result<RawResults> {
    let mut results = RawResults::default();
    let mut num_variables = 0usize;
    let mut lines = text.lines().peekable();

    while let Some(line) = lines.next() {
        if let Some(rest) = line.strip_prefix("Plotname:") {
            results.plotname = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("No. Variables:") {
            num_variables = rest
                .trim()
                .parse()
                .map_err(|_| Error::Rawfile(format!("bad variable count: {}", rest.trim())))?;
        } else if line.starts_with("Variables:") {
            for _ in 0..num_variables {
                let line = lines
                    .next()
                    .ok_or_else(|| Error::Rawfile("truncated variable list".to_string()))?;
                // "\t0\tv(1)\tvoltage"
                let mut fields = line.split_whitespace();
                let _index = fields.next();
                let name = fields
                    .next()
                    .ok_or_else(|| Error::Rawfile("variable line has no name".to_string()))?;
                results.variables.push(name.to_string());
                results.columns.push(Vec::new());
            }
        } else if line.starts_with("Values:") {
            parse_values(&mut lines, &mut results, num_variables)?;
        } else if line.starts_with("Binary:") {
            return Err(Error::Rawfile(
                "binary rawfile; expected ASCII output".to_string(),
            ));
        }
    }

    if results.variables.is_empty() {
        return Err(Error::Rawfile("no variables in rawfile".to_string()));
    }
    Ok(results)
}

fn parse_values<'a>(
    lines: &mut std::iter::Peekable<impl Iterator<Item = &'a str>>,
    results: &mut RawResults,
    num_variables: usize,
) -> Result<()> {
    if num_variables == 0 || results.columns.len() != num_variables {
        return Err(Error::Rawfile(
            "Values: section before variable declarations".to_string(),
        ));
    }
    let mut variable = 0usize;
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        if variable == 0 {
            // A new point block starts with its point index.
            if fields.next().is_none() {
                continue;
            }
        }
        for field in fields {
            let value = parse_scalar(field)?;
            results.columns[variable].push(value);
            variable = (variable + 1) % num_variables;
        }
    }
    Ok(())
}

/// A rawfile scalar: real, or `re,im` for complex (real part kept).
fn parse_scalar(field: &str) -> Result<f64> {
    let real = match field.split_once(',') {
        Some((re, _im)) => re,
        None => field,
    };
    real.parse()
        .map_err(|_| Error::Rawfile(format!("bad value: {}", field)))
}
