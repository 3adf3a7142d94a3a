use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use cm_tensor::{DType, Shape, Tensor};

/// Path to the gpu-matmul binary.
fn bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_gpu-matmul"))
}

fn iota(rows: usize, cols: usize) -> Tensor {
    let data = (0..rows * cols).map(|i| i as f32).collect();
    Tensor::new(data, Shape::matrix(rows, cols))
}

/// Write `a` and `b` to `dir` and run the binary on them.
fn run(dir: &Path, a: &Tensor, b: &Tensor, extra: &[&str]) -> Output {
    let m1 = cm_io::save_matrix(&dir.join("a"), a).unwrap();
    let m2 = cm_io::save_matrix(&dir.join("b"), b).unwrap();
    Command::new(bin())
        .arg("--m1")
        .arg(&m1)
        .arg("--m2")
        .arg(&m2)
        .arg("--ofile")
        .arg(dir.join("ab"))
        .args(extra)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

#[test]
fn host_product_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = (iota(4, 3), iota(3, 4));
    let out = run(dir.path(), &a, &b, &["--cpu_only", "1", "--fp16", "0"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let c = cm_io::load_matrix(&dir.path().join("ab.npy"), DType::F32).unwrap();
    assert_eq!(c, a.matmul(&b).unwrap());
}

#[test]
fn fp16_is_the_default() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(dir.path(), &iota(2, 2), &iota(2, 3), &["--cpu_only", "1"]);
    assert!(out.status.success());

    let file = cm_io::NpyFile::open(&dir.path().join("ab.npy")).unwrap();
    assert_eq!(file.header.descr.as_numpy_str(), "<f2");
    assert_eq!(file.header.shape, vec![2, 3]);
}

#[test]
fn dimension_mismatch_exits_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(dir.path(), &iota(4, 3), &iota(5, 4), &["--cpu_only", "1"]);
    assert_eq!(out.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Array dimensions do not match"));
    assert!(stderr.contains("[4x3] @ [5x4]"));
    assert!(!dir.path().join("ab.npy").exists());
}

#[test]
fn tiny_limit_still_gives_full_product() {
    // Blocked on an accelerator, direct after falling back to the host.
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = (iota(2, 2), iota(2, 5));
    let out = run(
        dir.path(),
        &a,
        &b,
        &["--fp16", "0", "--element-limit", "1", "--block-cols", "2", "--split-cols", "1"],
    );
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let c = cm_io::load_matrix(&dir.path().join("ab.npy"), DType::F32).unwrap();
    assert_eq!(c, a.matmul(&b).unwrap());
}

#[test]
fn zero_block_width_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(dir.path(), &iota(2, 2), &iota(2, 2), &["--block-cols", "0"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(!dir.path().join("ab.npy").exists());
}

#[cfg(not(feature = "hdf5"))]
#[test]
fn hdf5_without_support_fails() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(dir.path(), &iota(2, 2), &iota(2, 2), &["--cpu_only", "1", "--hdf5", "1"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(!dir.path().join("ab.hdf5").exists());
}

#[cfg(feature = "hdf5")]
#[test]
fn hdf5_output_written() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(dir.path(), &iota(2, 2), &iota(2, 3), &["--cpu_only", "1", "--hdf5", "1"]);
    assert!(out.status.success());
    assert!(dir.path().join("ab.hdf5").exists());
}
