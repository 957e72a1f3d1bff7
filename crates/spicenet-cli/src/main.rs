//! Spicenet command-line interface.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spicenet_core::Circuit;
use spicenet_parser::{Builder, SpiceLibrary};
use spicenet_sim::{Ngspice, Simulator};

#[derive(Parser)]
#[command(name = "spicenet")]
#[command(about = "SPICE netlist parser and canonicalizer", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Node name to treat as ground.
    #[arg(long, default_value = "0", global = true)]
    ground: String,

    /// Library directory to resolve missing subcircuits and models.
    #[arg(long, global = true)]
    lib: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and build a netlist, reporting the first problem found.
    Check {
        /// Input netlist file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
    /// Print the canonical rendering of a netlist.
    Expand {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
    /// Build a netlist and run it through ngspice.
    Run {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let library = match &cli.lib {
        Some(dir) => Some(
            SpiceLibrary::new(dir)
                .with_context(|| format!("scanning library {}", dir.display()))?,
        ),
        None => None,
    };

    match &cli.command {
        Commands::Check { input } => {
            let circuit = load(input, &cli.ground, library.as_ref())?;
            println!(
                "ok: {} element(s), {} model(s), {} subcircuit(s)",
                circuit.scope.elements.len(),
                circuit.scope.models.len(),
                circuit.scope.subcircuits.len()
            );
        }
        Commands::Expand { input } => {
            let circuit = load(input, &cli.ground, library.as_ref())?;
            print!("{}", circuit.to_spice());
        }
        Commands::Run { input } => {
            let circuit = load(input, &cli.ground, library.as_ref())?;
            let sim = Ngspice::default();
            let results = sim
                .run(&circuit.to_spice())
                .context("simulator run failed")?;
            println!("{}", results.plotname);
            for name in &results.variables {
                let column = results.vector(name).unwrap_or(&[]);
                match column {
                    [single] => println!("{:>16} = {}", name, single),
                    _ => println!("{:>16} : {} point(s)", name, column.len()),
                }
            }
        }
    }

    Ok(())
}

fn load(input: &PathBuf, ground: &str, library: Option<&SpiceLibrary>) -> Result<Circuit> {
    let tree = spicenet_parser::parse_file(input)
        .with_context(|| format!("parsing {}", input.display()))?;
    let mut builder = Builder::new().ground(ground);
    if let Some(library) = library {
        builder = builder.library(library);
    }
    builder
        .build(&tree)
        .with_context(|| format!("building {}", input.display()))
}
