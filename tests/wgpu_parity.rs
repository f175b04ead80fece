//! CPU / WebGPU parity for the hierarchical scan.
//!
//! Every test returns early when no GPU adapter is available.

#![cfg(all(feature = "wgpu", feature = "cpu"))]

mod common;

use common::{assert_allclose_f32, create_cpu_backend, create_wgpu_backend, reference_scan};
use scanr::config::ScanConfig;
use scanr::error::Error;
use scanr::io::{generate_ones, generate_uniform, verify_inclusive_scan};
use scanr::runtime::ComputeBackend;
use scanr::runtime::wgpu::WgpuBackend;
use scanr::scan::{Scanner, inclusive_scan};

fn setup() -> Option<WgpuBackend> {
    let backend = create_wgpu_backend();
    if backend.is_none() {
        println!("No GPU available, skipping test");
    }
    backend
}

#[test]
fn test_five_ones_block_size_four() {
    let Some(backend) = setup() else {
        return;
    };
    let out = inclusive_scan(&backend, &[1.0; 5], 4).unwrap();
    assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
}

#[test]
fn test_empty_and_single() {
    let Some(backend) = setup() else {
        return;
    };
    let scanner = Scanner::new(&backend, ScanConfig::new(64)).unwrap();
    assert!(scanner.scan(&[]).unwrap().is_empty());
    assert_eq!(scanner.scan(&[7.5]).unwrap(), vec![7.5]);
}

#[test]
fn test_million_ones() {
    let Some(backend) = setup() else {
        return;
    };
    let block_size = 256.min(backend.max_group_size());
    let input = generate_ones(1 << 20);

    let out = inclusive_scan(&backend, &input, block_size).unwrap();

    verify_inclusive_scan(&input, &out, 1e-2).unwrap();
}

#[test]
fn test_parity_with_cpu() {
    let Some(gpu) = setup() else {
        return;
    };
    let cpu = create_cpu_backend();
    let input = generate_uniform(50_000, 11);

    for block_size in [2, 3, 64, 128] {
        let gpu_out = inclusive_scan(&gpu, &input, block_size).unwrap();
        let cpu_out = inclusive_scan(&cpu, &input, block_size).unwrap();
        assert_allclose_f32(
            &gpu_out,
            &cpu_out,
            1e-4,
            1e-3,
            &format!("wgpu vs cpu, block size {block_size}"),
        );
        assert_allclose_f32(
            &gpu_out,
            &reference_scan(&input),
            1e-4,
            1e-2,
            &format!("wgpu vs reference, block size {block_size}"),
        );
    }
}

#[test]
fn test_block_size_above_device_limit() {
    let Some(backend) = setup() else {
        return;
    };
    let too_big = backend.max_group_size() * 2;
    match Scanner::new(&backend, ScanConfig::new(too_big)) {
        Err(Error::Configuration { arg, .. }) => assert_eq!(arg, "block_size"),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("block size {too_big} should exceed the device limit"),
    }
}
