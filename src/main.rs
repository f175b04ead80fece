//! scanr CLI - inclusive prefix sum of a number file
//!
//! Reads a count followed by that many numbers, scans them on the selected
//! backend and writes the running sums with three decimals.
//!
//! ```text
//! scanr --input input.txt --output output.txt --block-size 256 --verify
//! scanr --generate 1048576 --verify
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use scanr::{
    config::{DEFAULT_BLOCK_SIZE, ScanConfig},
    error::Result,
    io,
    runtime::{ComputeBackend, Device},
    scan::Scanner,
};

/// scanr - hierarchical block-parallel inclusive scan
#[derive(Parser, Debug)]
#[command(name = "scanr")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Input file: a count followed by that many numbers
    #[arg(short, long, env = "SCANR_INPUT", default_value = "input.txt")]
    input: PathBuf,

    /// Output file for the scanned values
    #[arg(short, long, env = "SCANR_OUTPUT", default_value = "output.txt")]
    output: PathBuf,

    /// Elements per block (= lanes per execution group)
    #[arg(short, long, env = "SCANR_BLOCK_SIZE", default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Compute backend
    #[arg(long, env = "SCANR_BACKEND", value_enum, default_value = "cpu")]
    backend: BackendKind,

    /// Adapter index for the wgpu backend (default: first discrete or integrated GPU)
    #[arg(long, env = "SCANR_DEVICE")]
    device: Option<usize>,

    /// Scan N ones instead of reading the input file
    #[arg(long, env = "SCANR_GENERATE", value_name = "N")]
    generate: Option<usize>,

    /// Check the result against a sequential prefix sum
    #[arg(long, env = "SCANR_VERIFY")]
    verify: bool,

    /// Absolute tolerance used by --verify
    #[arg(long, env = "SCANR_TOLERANCE", default_value = "1e-2")]
    tolerance: f32,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendKind {
    /// Host backend (always available)
    Cpu,
    /// WebGPU backend (requires the `wgpu` feature)
    Wgpu,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match dispatch(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: &Cli) -> Result<()> {
    match cli.backend {
        BackendKind::Cpu => run_cpu(cli),
        BackendKind::Wgpu => run_wgpu(cli),
    }
}

#[cfg(feature = "cpu")]
fn run_cpu(cli: &Cli) -> Result<()> {
    run(&scanr::runtime::cpu::CpuBackend::new(), cli)
}

#[cfg(not(feature = "cpu"))]
fn run_cpu(_cli: &Cli) -> Result<()> {
    Err(scanr::error::Error::configuration(
        "backend",
        "scanr was built without the `cpu` feature",
    ))
}

#[cfg(feature = "wgpu")]
fn run_wgpu(cli: &Cli) -> Result<()> {
    use scanr::runtime::wgpu::{WgpuBackend, WgpuDevice};

    let backend = match cli.device {
        Some(index) => WgpuBackend::with_device(WgpuDevice::new(index))?,
        None => WgpuBackend::new()?,
    };
    run(&backend, cli)
}

#[cfg(not(feature = "wgpu"))]
fn run_wgpu(_cli: &Cli) -> Result<()> {
    Err(scanr::error::Error::configuration(
        "backend",
        "scanr was built without the `wgpu` feature",
    ))
}

fn run<B: ComputeBackend>(backend: &B, cli: &Cli) -> Result<()> {
    let data = match cli.generate {
        Some(n) => io::generate_ones(n),
        None => io::read_sequence_file(&cli.input)?,
    };
    log::info!(
        "scanning {} values on {} ({})",
        data.len(),
        backend.name(),
        backend.device().name()
    );

    let scanner = Scanner::new(backend, ScanConfig::new(cli.block_size))?;
    let result = scanner.scan(&data)?;
    io::write_sequence_file(&cli.output, &result)?;

    if cli.verify {
        io::verify_inclusive_scan(&data, &result, cli.tolerance)?;
        log::info!("verified {} values within {}", data.len(), cli.tolerance);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["scanr"]).unwrap();
        assert_eq!(cli.input, PathBuf::from("input.txt"));
        assert_eq!(cli.output, PathBuf::from("output.txt"));
        assert_eq!(cli.block_size, 256);
        assert!(matches!(cli.backend, BackendKind::Cpu));
        assert!(!cli.verify);
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "scanr",
            "--generate",
            "1000",
            "--block-size",
            "64",
            "--backend",
            "wgpu",
            "--verify",
        ])
        .unwrap();
        assert_eq!(cli.generate, Some(1000));
        assert_eq!(cli.block_size, 64);
        assert!(matches!(cli.backend, BackendKind::Wgpu));
        assert!(cli.verify);
    }
}
