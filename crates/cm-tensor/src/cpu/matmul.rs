// Column-block matmul kernel shared by the CPU backend.
//
// The loop order is i-p-j so that both the row of A and the row slice of B
// are walked contiguously. Accumulation is always f32.

use crate::dtype::Element;

/// Compute `A @ B[:, start..end]` for row-major `a` [m, k] and `b` [k, n].
pub fn matmul_block<T: Element>(
    a: &[T],
    b: &[T],
    m: usize,
    k: usize,
    n: usize,
    start: usize,
    end: usize,
) -> Vec<T> {
    let width = end - start;
    let mut out = Vec::with_capacity(m * width);
    let mut acc = vec![0.0f32; width];
    for i in 0..m {
        acc.fill(0.0);
        let a_row = &a[i * k..(i + 1) * k];
        for (p, &a_ip) in a_row.iter().enumerate() {
            let a_ip = a_ip.to_f32();
            let b_row = &b[p * n + start..p * n + end];
            for (slot, &b_pj) in acc.iter_mut().zip(b_row) {
                *slot += a_ip * b_pj.to_f32();
            }
        }
        out.extend(acc.iter().map(|&v| T::from_f32(v)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    #[test]
    fn test_full_range() {
        let a = [1.0f32, 2.0, 3.0, 4.0];
        let b = [5.0f32, 6.0, 7.0, 8.0];
        assert_eq!(matmul_block(&a, &b, 2, 2, 2, 0, 2), vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_column_window() {
        // [1, 2] @ [[1, 2, 3], [4, 5, 6]] = [9, 12, 15]
        let a = [1.0f32, 2.0];
        let b = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(matmul_block(&a, &b, 1, 2, 3, 1, 3), vec![12.0, 15.0]);
        assert!(matmul_block(&a, &b, 1, 2, 3, 2, 2).is_empty());
    }

    #[test]
    fn test_f16_accumulates_in_f32() {
        let a: Vec<f16> = [1.0f32, 1.0].iter().map(|&v| f16::from_f32(v)).collect();
        let b: Vec<f16> = [0.5f32, 0.25].iter().map(|&v| f16::from_f32(v)).collect();
        let c = matmul_block(&a, &b, 1, 2, 1, 0, 1);
        assert_eq!(c[0].to_f32(), 0.75);
    }
}
