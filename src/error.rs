use thiserror::Error;

/// Errors produced by the eigensolver framework.
///
/// Configuration problems are rejected before any operator application.
/// `Breakdown` is the one runtime fault with no recovery: a vanishing
/// Lanczos normalization denominator signals that an invariant subspace
/// was hit, and it is surfaced rather than divided through.
#[derive(Error, Debug)]
pub enum EigError {
    #[error("invalid eigensolver configuration: {0}")]
    Config(String),

    #[error("requested solver family is not implemented: {0}")]
    Unsupported(String),

    #[error("Lanczos breakdown at step {step}: |beta| = {beta:.6e} signals an invariant subspace")]
    Breakdown { step: usize, beta: f64 },

    #[error("dense symmetric eigensolver failed: {0}")]
    DenseSolve(String),

    #[error("operator exposes no factor application; singular-value mode needs one")]
    FactorUnavailable,

    #[error("correction solver failed: {0}")]
    Correction(String),

    #[error("vector i/o failed: {0}")]
    VecIo(String),

    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl From<std::io::Error> for EigError {
    fn from(e: std::io::Error) -> Self {
        EigError::VecIo(e.to_string())
    }
}

impl From<serde_json::Error> for EigError {
    fn from(e: serde_json::Error) -> Self {
        EigError::VecIo(e.to_string())
    }
}
