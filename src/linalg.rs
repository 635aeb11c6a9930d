//! Small dense linear systems for loop facility counts

/// Pivots smaller than this, relative to the largest coefficient, count as zero.
const PIVOT_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LinearSolveError {
    #[error("matrix is singular")]
    Singular,
    #[error("matrix is {rows}x{cols} but right-hand side has {rhs} entries")]
    DimensionMismatch { rows: usize, cols: usize, rhs: usize },
}

/// Solve the square system `a x = b` by Gaussian elimination with partial pivoting.
pub fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, LinearSolveError> {
    let n = a.len();
    if b.len() != n || a.iter().any(|row| row.len() != n) {
        return Err(LinearSolveError::DimensionMismatch {
            rows: n,
            cols: a.first().map_or(0, Vec::len),
            rhs: b.len(),
        });
    }
    let scale = a
        .iter()
        .flatten()
        .fold(0.0_f64, |m, v| m.max(v.abs()))
        .max(1.0);

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() <= PIVOT_EPSILON * scale {
            return Err(LinearSolveError::Singular);
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

/// Least-squares solution of a rectangular system through the normal equations.
pub fn least_squares(a: &[Vec<f64>], b: &[f64]) -> Result<Vec<f64>, LinearSolveError> {
    let rows = a.len();
    let cols = a.first().map_or(0, Vec::len);
    if b.len() != rows || a.iter().any(|row| row.len() != cols) {
        return Err(LinearSolveError::DimensionMismatch {
            rows,
            cols,
            rhs: b.len(),
        });
    }

    let mut ata = vec![vec![0.0; cols]; cols];
    let mut atb = vec![0.0; cols];
    for i in 0..cols {
        for j in 0..cols {
            ata[i][j] = (0..rows).map(|r| a[r][i] * a[r][j]).sum();
        }
        atb[i] = (0..rows).map(|r| a[r][i] * b[r]).sum();
    }
    solve(ata, atb)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: &[f64], b: &[f64]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-9)
    }

    #[test]
    fn solves_two_by_two() {
        let x = solve(vec![vec![2.0, 1.0], vec![1.0, 3.0]], vec![3.0, 5.0]).unwrap();
        assert!(close(&x, &[0.8, 1.4]));
    }

    #[test]
    fn needs_pivoting() {
        let x = solve(vec![vec![0.0, 1.0], vec![1.0, 0.0]], vec![2.0, 3.0]).unwrap();
        assert!(close(&x, &[3.0, 2.0]));
    }

    #[test]
    fn singular_is_reported() {
        let err = solve(vec![vec![1.0, 2.0], vec![2.0, 4.0]], vec![1.0, 2.0]).unwrap_err();
        assert_eq!(err, LinearSolveError::Singular);
    }

    #[test]
    fn dimension_mismatch() {
        assert!(matches!(
            solve(vec![vec![1.0]], vec![1.0, 2.0]),
            Err(LinearSolveError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn least_squares_matches_exact_solution_when_consistent() {
        // Three equations, two unknowns, consistent with x = (1, 2).
        let a = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]];
        let x = least_squares(&a, &[1.0, 2.0, 3.0]).unwrap();
        assert!(close(&x, &[1.0, 2.0]));
    }
}
