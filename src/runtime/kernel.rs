//! Kernel identities, launch geometry and typed kernel arguments
//!
//! Both backends expose the same two kernels. Arguments are passed as an
//! ordered list of [`KernelArg`]s, mirroring how a compute API binds
//! positional kernel parameters:
//!
//! ```text
//! local_block_scan(size, input, output, __local scratch_a, __local scratch_b, block_totals)
//! carry_propagation(size, data, scanned_totals)
//! ```
//!
//! The `decode_*` helpers validate an argument list once, so each backend only
//! deals with well-formed bindings.

use std::fmt;

use crate::error::{Error, Result};

/// The kernels a compiled [`Program`](super::Program) must provide
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KernelName {
    /// Hillis-Steele scan of each block plus per-block totals
    LocalBlockScan,
    /// Adds each block's carry-in to its elements
    CarryPropagation,
}

impl KernelName {
    /// All kernels, in compilation order
    pub const ALL: [KernelName; 2] = [KernelName::LocalBlockScan, KernelName::CarryPropagation];

    /// Entry point name in generated source
    pub fn entry_point(self) -> &'static str {
        match self {
            KernelName::LocalBlockScan => "local_block_scan",
            KernelName::CarryPropagation => "carry_propagation",
        }
    }
}

impl fmt::Display for KernelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entry_point())
    }
}

/// Options baked into a program at compile time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramOptions {
    /// Execution-group size, compiled in as a constant
    pub block_size: u32,
}

/// Launch geometry for one dispatch
///
/// `global_size` is the total lane count and must be a multiple of
/// `local_size`; lanes past the data length are masked by the kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Total lanes across all groups
    pub global_size: usize,
    /// Lanes per group
    pub local_size: usize,
}

impl LaunchConfig {
    /// Geometry covering `len` elements with groups of `block_size` lanes
    pub fn for_elements(len: usize, block_size: usize) -> Self {
        Self {
            global_size: len.div_ceil(block_size) * block_size,
            local_size: block_size,
        }
    }

    /// Number of execution groups
    pub fn group_count(&self) -> usize {
        self.global_size / self.local_size
    }

    /// Check the geometry against a program's compiled group size.
    pub fn validate(&self, kernel: KernelName, compiled_block_size: u32) -> Result<()> {
        if self.local_size != compiled_block_size as usize {
            return Err(Error::configuration(
                "local_size",
                format!(
                    "{kernel} launched with {} lanes per group but compiled for {compiled_block_size}",
                    self.local_size
                ),
            ));
        }
        if !self.global_size.is_multiple_of(self.local_size) {
            return Err(Error::dispatch(
                kernel.entry_point(),
                format!(
                    "global size {} is not a multiple of local size {}",
                    self.global_size, self.local_size
                ),
            ));
        }
        Ok(())
    }
}

/// A positional kernel argument
pub enum KernelArg<'a, B> {
    /// Device buffer
    Buffer(&'a B),
    /// 32-bit scalar passed by value
    Scalar(u32),
    /// Per-group scratch memory request, in elements
    Local(usize),
}

impl<B> KernelArg<'_, B> {
    fn kind(&self) -> &'static str {
        match self {
            KernelArg::Buffer(_) => "buffer",
            KernelArg::Scalar(_) => "scalar",
            KernelArg::Local(_) => "local",
        }
    }
}

// Manual impls: `B` itself need not be Clone/Copy.
impl<B> Clone for KernelArg<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B> Copy for KernelArg<'_, B> {}

/// Bound arguments of `local_block_scan`
pub struct LocalBlockScanArgs<'a, B> {
    /// Number of valid input elements
    pub size: usize,
    /// Elements to scan
    pub input: &'a B,
    /// Per-block inclusive scan, same length as input
    pub output: &'a B,
    /// One total per block
    pub block_totals: &'a B,
}

/// Bound arguments of `carry_propagation`
pub struct CarryPropagationArgs<'a, B> {
    /// Number of valid elements in `data`
    pub size: usize,
    /// Locally scanned values, updated in place
    pub data: &'a B,
    /// Inclusive scan of the block totals (read with a shift of one block)
    pub scanned_totals: &'a B,
}

fn arity_error(kernel: KernelName, expected: usize, got: usize) -> Error {
    Error::dispatch(
        kernel.entry_point(),
        format!("expected {expected} arguments, got {got}"),
    )
}

fn kind_error<B>(
    kernel: KernelName,
    position: usize,
    expected: &str,
    got: &KernelArg<'_, B>,
) -> Error {
    Error::dispatch(
        kernel.entry_point(),
        format!(
            "argument {position} must be a {expected}, got a {}",
            got.kind()
        ),
    )
}

fn scalar<B>(kernel: KernelName, args: &[KernelArg<'_, B>], position: usize) -> Result<usize> {
    match args[position] {
        KernelArg::Scalar(v) => Ok(v as usize),
        ref other => Err(kind_error(kernel, position, "scalar", other)),
    }
}

fn buffer<'a, B>(kernel: KernelName, args: &[KernelArg<'a, B>], position: usize) -> Result<&'a B> {
    match args[position] {
        KernelArg::Buffer(b) => Ok(b),
        ref other => Err(kind_error(kernel, position, "buffer", other)),
    }
}

fn local<B>(
    kernel: KernelName,
    args: &[KernelArg<'_, B>],
    position: usize,
    block_size: u32,
) -> Result<()> {
    match args[position] {
        KernelArg::Local(elements) if elements == block_size as usize => Ok(()),
        KernelArg::Local(elements) => Err(Error::configuration(
            "local_memory",
            format!(
                "{kernel} requested {elements} scratch elements per group but was compiled for {block_size}"
            ),
        )),
        ref other => Err(kind_error(kernel, position, "local", other)),
    }
}

/// Validate and bind the arguments of `local_block_scan`.
pub fn decode_local_block_scan<'a, B>(
    args: &[KernelArg<'a, B>],
    block_size: u32,
) -> Result<LocalBlockScanArgs<'a, B>> {
    let kernel = KernelName::LocalBlockScan;
    if args.len() != 6 {
        return Err(arity_error(kernel, 6, args.len()));
    }
    let size = scalar(kernel, args, 0)?;
    let input = buffer(kernel, args, 1)?;
    let output = buffer(kernel, args, 2)?;
    local(kernel, args, 3, block_size)?;
    local(kernel, args, 4, block_size)?;
    let block_totals = buffer(kernel, args, 5)?;
    Ok(LocalBlockScanArgs {
        size,
        input,
        output,
        block_totals,
    })
}

/// Validate and bind the arguments of `carry_propagation`.
pub fn decode_carry_propagation<'a, B>(
    args: &[KernelArg<'a, B>],
) -> Result<CarryPropagationArgs<'a, B>> {
    let kernel = KernelName::CarryPropagation;
    if args.len() != 3 {
        return Err(arity_error(kernel, 3, args.len()));
    }
    Ok(CarryPropagationArgs {
        size: scalar(kernel, args, 0)?,
        data: buffer(kernel, args, 1)?,
        scanned_totals: buffer(kernel, args, 2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_config_rounds_up() {
        let launch = LaunchConfig::for_elements(5, 4);
        assert_eq!(launch.global_size, 8);
        assert_eq!(launch.group_count(), 2);
        assert!(launch.validate(KernelName::LocalBlockScan, 4).is_ok());
    }

    #[test]
    fn test_launch_config_rejects_mismatched_group_size() {
        let launch = LaunchConfig::for_elements(1024, 256);
        let err = launch.validate(KernelName::LocalBlockScan, 16).unwrap_err();
        assert!(matches!(err, Error::Configuration { arg: "local_size", .. }));
    }

    #[test]
    fn test_decode_local_block_scan_checks_arity_and_kinds() {
        let buf = 0u8;
        let args = [KernelArg::Scalar(5), KernelArg::Buffer(&buf)];
        assert!(decode_local_block_scan(&args, 4).is_err());

        let args = [
            KernelArg::Scalar(5),
            KernelArg::Buffer(&buf),
            KernelArg::Buffer(&buf),
            KernelArg::Local(4),
            KernelArg::Scalar(4),
            KernelArg::Buffer(&buf),
        ];
        let err = decode_local_block_scan(&args, 4).err().unwrap();
        assert!(err.to_string().contains("argument 4 must be a local"));
    }

    #[test]
    fn test_decode_local_block_scan_checks_scratch_size() {
        let buf = 0u8;
        let args = [
            KernelArg::Scalar(5),
            KernelArg::Buffer(&buf),
            KernelArg::Buffer(&buf),
            KernelArg::Local(256),
            KernelArg::Local(256),
            KernelArg::Buffer(&buf),
        ];
        assert!(decode_local_block_scan(&args, 16).is_err());
        let bound = decode_local_block_scan(&args, 256).unwrap();
        assert_eq!(bound.size, 5);
    }

    #[test]
    fn test_decode_carry_propagation() {
        let buf = 0u8;
        let args = [
            KernelArg::Scalar(9),
            KernelArg::Buffer(&buf),
            KernelArg::Buffer(&buf),
        ];
        assert_eq!(decode_carry_propagation(&args).unwrap().size, 9);
    }
}
