//! Eigendecomposition of small real square matrices
//!
//! Binned covariances are symmetric up to round-off, so the symmetric solver
//! handles almost every call. For genuinely non-symmetric input the spectrum
//! is read off the real Schur form; eigenpairs are only formed for eigenvalues
//! whose real part reaches a floor, and those must be real to working
//! precision. Their eigenvectors are recovered as null vectors of `A - λI`
//! via SVD.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex;

/// Relative asymmetry below which the symmetric solver is used
const SYMMETRY_RTOL: f64 = 1e-10;

/// Relative imaginary part above which an eigenvalue counts as complex
const IMAG_RTOL: f64 = 1e-8;

/// Relative distance under which two eigenvalues are treated as one cluster
const CLUSTER_RTOL: f64 = 1e-9;

/// Error types for eigendecomposition
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EigenError {
    #[error("Matrix is empty")]
    EmptyMatrix,
    #[error("Matrix is not square: {0}x{1}")]
    NotSquare(usize, usize),
    #[error("Matrix contains non-finite entries")]
    NonFinite,
    #[error("Eigenvalue {value} has a non-negligible imaginary part")]
    ComplexEigenvalue { value: Complex<f64> },
}

/// Eigenpairs of a square matrix at or above a floor
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    /// Full spectrum, possibly complex
    pub spectrum: Vec<Complex<f64>>,
    /// Real eigenvalues whose value reaches the floor
    pub values: DVector<f64>,
    /// Unit-norm eigenvectors; column `i` belongs to `values[i]`
    pub vectors: DMatrix<f64>,
}

/// Compute all real eigenpairs of `matrix`
///
/// # Errors
/// * `EmptyMatrix`, `NotSquare`, `NonFinite` for unusable input
/// * `ComplexEigenvalue` if the spectrum is not real to working precision
pub fn eigen_decompose(matrix: &DMatrix<f64>) -> Result<EigenDecomposition, EigenError> {
    eigen_decompose_above(matrix, f64::NEG_INFINITY)
}

/// Compute the eigenpairs of `matrix` whose eigenvalue real part is `>= floor`
///
/// Eigenvalues below the floor only appear in `spectrum` and may be complex.
///
/// # Errors
/// * `EmptyMatrix`, `NotSquare`, `NonFinite` for unusable input
/// * `ComplexEigenvalue` if an eigenvalue at or above the floor has a
///   non-negligible imaginary part
pub fn eigen_decompose_above(
    matrix: &DMatrix<f64>,
    floor: f64,
) -> Result<EigenDecomposition, EigenError> {
    let (m, n) = matrix.shape();
    if m == 0 || n == 0 {
        return Err(EigenError::EmptyMatrix);
    }
    if m != n {
        return Err(EigenError::NotSquare(m, n));
    }
    if matrix.iter().any(|x| !x.is_finite()) {
        return Err(EigenError::NonFinite);
    }

    if is_symmetric(matrix) {
        let sym = (matrix + matrix.transpose()) * 0.5;
        let eig = sym.symmetric_eigen();
        let kept: Vec<usize> = (0..n).filter(|&i| eig.eigenvalues[i] >= floor).collect();
        let mut vectors = DMatrix::<f64>::zeros(n, kept.len());
        for (k, &i) in kept.iter().enumerate() {
            vectors.set_column(k, &eig.eigenvectors.column(i));
        }
        return Ok(EigenDecomposition {
            spectrum: eig.eigenvalues.iter().map(|&x| Complex::new(x, 0.0)).collect(),
            values: DVector::from_iterator(kept.len(), kept.iter().map(|&i| eig.eigenvalues[i])),
            vectors,
        });
    }

    general_eigen(matrix, floor)
}

fn is_symmetric(matrix: &DMatrix<f64>) -> bool {
    let scale = matrix.amax();
    if scale == 0.0 {
        return true;
    }
    let asym = (matrix - matrix.transpose()).amax();
    asym <= SYMMETRY_RTOL * scale
}

fn general_eigen(matrix: &DMatrix<f64>, floor: f64) -> Result<EigenDecomposition, EigenError> {
    let n = matrix.nrows();
    let spectrum: Vec<Complex<f64>> = matrix.complex_eigenvalues().iter().copied().collect();

    let radius = spectrum.iter().map(|z| z.norm()).fold(0.0_f64, f64::max);
    let imag_tol = IMAG_RTOL * radius.max(f64::MIN_POSITIVE);

    let mut values = Vec::with_capacity(n);
    for z in spectrum.iter().filter(|z| z.re >= floor) {
        if z.im.abs() > imag_tol {
            return Err(EigenError::ComplexEigenvalue { value: *z });
        }
        values.push(z.re);
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let kept = values.len();
    let mut vectors = DMatrix::<f64>::zeros(n, kept);
    let cluster_tol = CLUSTER_RTOL * radius.max(1.0);
    let mut start = 0;
    while start < kept {
        let mut end = start + 1;
        while end < kept && (values[end] - values[start]).abs() <= cluster_tol {
            end += 1;
        }
        let lambda = values[start..end].iter().sum::<f64>() / (end - start) as f64;
        let null = null_vectors(matrix, lambda, end - start);
        for (k, v) in null.into_iter().enumerate() {
            vectors.set_column(start + k, &v);
        }
        start = end;
    }

    Ok(EigenDecomposition {
        spectrum,
        values: DVector::from_vec(values),
        vectors,
    })
}

/// Right singular vectors of `A - λI` for its `count` smallest singular values
fn null_vectors(matrix: &DMatrix<f64>, lambda: f64, count: usize) -> Vec<DVector<f64>> {
    let n = matrix.nrows();
    let shifted = matrix - DMatrix::<f64>::identity(n, n) * lambda;
    let svd = shifted.svd(false, true);

    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&a, &b| svd.singular_values[a].total_cmp(&svd.singular_values[b]));

    match svd.v_t {
        Some(v_t) => order
            .into_iter()
            .take(count)
            .map(|k| v_t.row(k).transpose().normalize())
            .collect(),
        None => Vec::new(),
    }
}
