use std::path::PathBuf;

use crate::error::EigError;

/// Which end of the spectrum is wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Smallest,
    Largest,
}

/// How eigenvalues are compared when selecting the wanted end.
///
/// The Lanczos family only supports `Real`; the other kinds exist for
/// operators whose spectrum is ordered by magnitude or imaginary part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectrumKind {
    Real,
    Magnitude,
    Imaginary,
}

/// Spectrum target: which extremal eigenvalues to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spectrum {
    pub extremum: Extremum,
    pub kind: SpectrumKind,
}

impl Spectrum {
    pub const SMALLEST_REAL: Spectrum = Spectrum {
        extremum: Extremum::Smallest,
        kind: SpectrumKind::Real,
    };
    pub const LARGEST_REAL: Spectrum = Spectrum {
        extremum: Extremum::Largest,
        kind: SpectrumKind::Real,
    };
}

/// Chebyshev acceleration parameters.
///
/// `[a_min, a_max]` must bound the unwanted part of the spectrum; eigenvalues
/// outside that interval are amplified by the degree-`degree` polynomial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolyAcc {
    pub degree: usize,
    pub a_min: f64,
    pub a_max: f64,
}

/// The closed set of solver families the factory can instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverFamily {
    Trlm,
    Jd,
    Arnoldi,
}

/// Eigensolver configuration.
///
/// # Fields
/// - n_ev: search-space size (initial factorization length)
/// - n_kr: Krylov-space size; TRLM needs `n_kr >= n_ev + 6` of restart slack
/// - n_conv: number of eigenpairs requested
/// - tol: relative residual tolerance, scaled by the running matrix norm
/// - max_restarts: restart budget before the solve is reported as partial
/// - spectrum: which extremal eigenvalues to seek
/// - poly: Chebyshev acceleration, `None` for the plain operator
/// - compute_svd: treat the operator as `M^H M` and recover singular pairs
/// - vec_infile/vec_outfile: optional vector-set persistence paths
/// - random_seed: seed for noise vectors; 0 draws one from the clock
#[derive(Debug, Clone)]
pub struct EigParams {
    pub n_ev: usize,
    pub n_kr: usize,
    pub n_conv: usize,
    pub tol: f64,
    pub max_restarts: usize,
    pub spectrum: Spectrum,
    pub poly: Option<PolyAcc>,
    pub compute_svd: bool,
    pub family: SolverFamily,
    pub vec_infile: Option<PathBuf>,
    pub vec_outfile: Option<PathBuf>,
    pub random_seed: u64,
}

impl EigParams {
    /// A TRLM configuration with the usual defaults.
    pub fn new(n_ev: usize, n_kr: usize, n_conv: usize) -> Self {
        Self {
            n_ev,
            n_kr,
            n_conv,
            tol: 1.0e-6,
            max_restarts: 100,
            spectrum: Spectrum::SMALLEST_REAL,
            poly: None,
            compute_svd: false,
            family: SolverFamily::Trlm,
            vec_infile: None,
            vec_outfile: None,
            random_seed: 0,
        }
    }

    /// Validate the configuration. Every rejection here happens before any
    /// operator application.
    pub fn validate(&self) -> Result<(), EigError> {
        if self.n_ev == 0 || self.n_kr == 0 || self.n_conv == 0 {
            return Err(EigError::Config(format!(
                "nEv={}, nKr={}, nConv={} must all be nonzero",
                self.n_ev, self.n_kr, self.n_conv
            )));
        }
        if self.n_kr <= self.n_ev {
            return Err(EigError::Config(format!(
                "nKr={} must be greater than nEv={}",
                self.n_kr, self.n_ev
            )));
        }
        if self.n_ev < self.n_conv {
            return Err(EigError::Config(format!(
                "nConv={} must not exceed nEv={}",
                self.n_conv, self.n_ev
            )));
        }
        if let Some(poly) = &self.poly {
            if poly.degree == 0 {
                return Err(EigError::Config(
                    "polynomial acceleration requested with zero degree".to_string(),
                ));
            }
            if !(poly.a_min < poly.a_max) {
                return Err(EigError::Config(format!(
                    "polynomial window [{}, {}] is empty",
                    poly.a_min, poly.a_max
                )));
            }
        }
        match self.family {
            SolverFamily::Trlm => {
                if self.n_kr < self.n_ev + 6 {
                    return Err(EigError::Config(format!(
                        "nKr={} must be at least nEv+6={} for thick restarting",
                        self.n_kr,
                        self.n_ev + 6
                    )));
                }
                if self.spectrum.kind != SpectrumKind::Real {
                    return Err(EigError::Config(
                        "the Lanczos solver only targets the real spectrum".to_string(),
                    ));
                }
            }
            SolverFamily::Jd => {}
            SolverFamily::Arnoldi => {
                return Err(EigError::Unsupported("Arnoldi".to_string()));
            }
        }
        Ok(())
    }

    /// Whether the dense solve must see the negated spectrum so that the
    /// wanted Ritz values land at the front of its ascending output.
    ///
    /// Acceleration maps wanted eigenvalues (outside the damping window) to
    /// large polynomial values, so every target except smallest-real without
    /// acceleration needs the flip. Computed once; the solvers never consult
    /// the raw target again.
    pub fn search_reversed(&self) -> bool {
        match (self.spectrum.extremum, self.poly.is_some()) {
            (Extremum::Smallest, false) => false,
            (Extremum::Smallest, true) => true,
            (Extremum::Largest, _) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> EigParams {
        EigParams::new(10, 20, 5)
    }

    #[test]
    fn default_params_validate() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn rejects_nkr_not_above_nev() {
        let mut p = base();
        p.n_kr = 10;
        assert!(matches!(p.validate(), Err(EigError::Config(_))));
        p.n_kr = 8;
        assert!(matches!(p.validate(), Err(EigError::Config(_))));
    }

    #[test]
    fn rejects_nconv_above_nev() {
        let mut p = base();
        p.n_conv = 11;
        assert!(matches!(p.validate(), Err(EigError::Config(_))));
    }

    #[test]
    fn rejects_zero_counts() {
        let cases: [fn(&mut EigParams); 3] = [
            |p| p.n_ev = 0,
            |p| p.n_kr = 0,
            |p| p.n_conv = 0,
        ];
        for f in cases {
            let mut p = base();
            f(&mut p);
            assert!(matches!(p.validate(), Err(EigError::Config(_))));
        }
    }

    #[test]
    fn rejects_missing_restart_slack() {
        let mut p = base();
        p.n_kr = 15; // > n_ev but < n_ev + 6
        assert!(matches!(p.validate(), Err(EigError::Config(_))));
    }

    #[test]
    fn rejects_zero_poly_degree() {
        let mut p = base();
        p.poly = Some(PolyAcc {
            degree: 0,
            a_min: 1.0,
            a_max: 2.0,
        });
        assert!(matches!(p.validate(), Err(EigError::Config(_))));
    }

    #[test]
    fn rejects_non_real_spectrum_for_trlm() {
        let mut p = base();
        p.spectrum = Spectrum {
            extremum: Extremum::Largest,
            kind: SpectrumKind::Magnitude,
        };
        assert!(matches!(p.validate(), Err(EigError::Config(_))));
    }

    #[test]
    fn rejects_arnoldi() {
        let mut p = base();
        p.family = SolverFamily::Arnoldi;
        assert!(matches!(p.validate(), Err(EigError::Unsupported(_))));
    }

    #[test]
    fn reverse_flag_per_target() {
        let mut p = base();
        assert!(!p.search_reversed());
        p.spectrum = Spectrum::LARGEST_REAL;
        assert!(p.search_reversed());
        p.poly = Some(PolyAcc {
            degree: 8,
            a_min: 1.0,
            a_max: 2.0,
        });
        assert!(p.search_reversed());
        p.spectrum = Spectrum::SMALLEST_REAL;
        assert!(p.search_reversed());
    }
}
