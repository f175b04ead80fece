//! Sequence input, output and verification
//!
//! The on-disk format is a count followed by that many whitespace-separated
//! numbers. Output is written with three decimals, separated by single
//! spaces and terminated by a newline.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};

/// Read a count-prefixed sequence.
///
/// Token positions in errors are zero-based, with the count at position 0.
/// Values after the announced count are ignored.
pub fn read_sequence(mut reader: impl BufRead) -> Result<Vec<f32>> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let mut tokens = text.split_whitespace();

    let count_token = tokens.next().ok_or_else(|| Error::Parse {
        position: 0,
        reason: "missing element count".to_string(),
    })?;
    let count: usize = count_token.parse().map_err(|_| Error::Parse {
        position: 0,
        reason: format!("'{count_token}' is not a valid element count"),
    })?;

    // The count is untrusted; cap the upfront reservation by what the text could hold.
    let mut values = Vec::with_capacity(count.min(text.len() / 2 + 1));
    for position in 1..=count {
        let token = tokens.next().ok_or_else(|| Error::Parse {
            position,
            reason: format!("expected {count} values, found {}", position - 1),
        })?;
        let value: f32 = token.parse().map_err(|_| Error::Parse {
            position,
            reason: format!("'{token}' is not a number"),
        })?;
        values.push(value);
    }
    Ok(values)
}

/// Read a count-prefixed sequence from a file
pub fn read_sequence_file(path: impl AsRef<Path>) -> Result<Vec<f32>> {
    read_sequence(BufReader::new(File::open(path)?))
}

/// Write values with three decimals, space separated, newline terminated.
///
/// An empty sequence writes nothing.
pub fn write_sequence(mut writer: impl Write, values: &[f32]) -> Result<()> {
    for (i, value) in values.iter().enumerate() {
        let sep = if i + 1 == values.len() { '\n' } else { ' ' };
        write!(writer, "{value:.3}{sep}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Write values to a file, see [`write_sequence`]
pub fn write_sequence_file(path: impl AsRef<Path>, values: &[f32]) -> Result<()> {
    write_sequence(BufWriter::new(File::create(path)?), values)
}

/// `n` ones
pub fn generate_ones(n: usize) -> Vec<f32> {
    vec![1.0; n]
}

/// `n` values drawn uniformly from `[-1, 1)` with a fixed seed
pub fn generate_uniform(n: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.random_range(-1.0f32..1.0)).collect()
}

/// Check `output` against a sequential f32 prefix sum of `input`.
///
/// Returns [`Error::Mismatch`] at the first index differing by more than
/// `eps`, or [`Error::LengthMismatch`] if the lengths differ.
pub fn verify_inclusive_scan(input: &[f32], output: &[f32], eps: f32) -> Result<()> {
    if input.len() != output.len() {
        return Err(Error::LengthMismatch {
            expected: input.len(),
            got: output.len(),
        });
    }

    let mut running = 0.0f32;
    for (index, (&x, &got)) in input.iter().zip(output).enumerate() {
        running += x;
        let diff = (running - got).abs();
        if diff.is_nan() || diff > eps {
            return Err(Error::Mismatch {
                index,
                expected: running,
                got,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_sequence() {
        let values = read_sequence("3\n1.5 -2\n4e1 99".as_bytes()).unwrap();
        assert_eq!(values, vec![1.5, -2.0, 40.0]);
    }

    #[test]
    fn test_read_sequence_zero_count() {
        assert!(read_sequence("0".as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_read_sequence_errors() {
        match read_sequence("".as_bytes()) {
            Err(Error::Parse { position: 0, .. }) => {}
            other => panic!("expected parse error at 0, got {other:?}"),
        }
        match read_sequence("4 1 2 3".as_bytes()) {
            Err(Error::Parse { position: 4, .. }) => {}
            other => panic!("expected parse error at 4, got {other:?}"),
        }
        match read_sequence("2 1 x".as_bytes()) {
            Err(Error::Parse { position: 2, reason }) => assert!(reason.contains("'x'")),
            other => panic!("expected parse error at 2, got {other:?}"),
        }
        assert!(read_sequence("-1".as_bytes()).is_err());
    }

    #[test]
    fn test_write_sequence_format() {
        let mut out = Vec::new();
        write_sequence(&mut out, &[1.0, 2.5, 1.0 / 3.0]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1.000 2.500 0.333\n");

        let mut out = Vec::new();
        write_sequence(&mut out, &[]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_generators() {
        assert_eq!(generate_ones(3), vec![1.0, 1.0, 1.0]);
        let a = generate_uniform(100, 7);
        assert_eq!(a, generate_uniform(100, 7));
        assert!(a.iter().all(|v| (-1.0..1.0).contains(v)));
    }

    #[test]
    fn test_verify_inclusive_scan() {
        let input = [1.0, 2.0, 3.0];
        assert!(verify_inclusive_scan(&input, &[1.0, 3.0, 6.0], 1e-2).is_ok());
        match verify_inclusive_scan(&input, &[1.0, 3.5, 6.0], 1e-2) {
            Err(Error::Mismatch { index, expected, got }) => {
                assert_eq!(index, 1);
                assert_eq!(expected, 3.0);
                assert_eq!(got, 3.5);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
        match verify_inclusive_scan(&input, &[1.0, 3.0], 1e-2) {
            Err(Error::LengthMismatch { expected, got }) => {
                assert_eq!(expected, 3);
                assert_eq!(got, 2);
            }
            other => panic!("expected length mismatch, got {other:?}"),
        }
    }
}
