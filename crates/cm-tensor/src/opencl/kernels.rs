//! OpenCL kernel sources.

/// Entry point name of [`MATMUL_COLS_KERNEL`], NUL-terminated for the C API.
pub const MATMUL_COLS_ENTRY: &[u8] = b"matmul_cols\0";

/// Column-block product `c = a @ b[:, col_start .. col_start + width]`.
///
/// One work item per output element. Index arithmetic is done in `ulong`
/// so that products past 2^31 elements stay addressable.
pub static MATMUL_COLS_KERNEL: &str = r#"
__kernel void matmul_cols(
    __global const float* a,
    __global const float* b,
    __global float* c,
    const uint m,
    const uint k,
    const uint ldb,
    const uint col_start,
    const uint width
) {
    const size_t row = get_global_id(0);
    const size_t col = get_global_id(1);
    if (row >= m || col >= width) {
        return;
    }

    const ulong a_row = (ulong)row * k;
    const ulong b_col = (ulong)col_start + col;
    float sum = 0.0f;
    for (uint p = 0; p < k; p++) {
        sum = fma(a[a_row + p], b[(ulong)p * ldb + b_col], sum);
    }
    c[(ulong)row * width + col] = sum;
}
"#;
