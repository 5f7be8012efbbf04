//! Vector-set persistence.
//!
//! Vectors are stored as f64 JSON regardless of the working precision, with
//! the dimension in the header so a set saved against one operator cannot be
//! silently replayed against another.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EigError;
use crate::EigFloat;

#[derive(Debug, Serialize, Deserialize)]
struct VectorSetFile {
    dim: usize,
    vectors: Vec<Vec<f64>>,
}

/// Save a vector set to `path`, overwriting any existing file.
pub fn save_vectors<T, P>(vectors: &[Vec<T>], path: P) -> Result<(), EigError>
where
    T: EigFloat,
    P: AsRef<Path>,
{
    let set = VectorSetFile {
        dim: vectors.first().map_or(0, Vec::len),
        vectors: vectors
            .iter()
            .map(|v| v.iter().map(|x| x.to_f64().unwrap_or(0.0)).collect())
            .collect(),
    };
    let out = File::create(path.as_ref())?;
    serde_json::to_writer(BufWriter::new(out), &set)?;
    Ok(())
}

/// Load a vector set from `path`, validating every length against the header
/// and the header against `expected_dim`.
pub fn load_vectors<T, P>(path: P, expected_dim: usize) -> Result<Vec<Vec<T>>, EigError>
where
    T: EigFloat,
    P: AsRef<Path>,
{
    let input = File::open(path.as_ref())?;
    let set: VectorSetFile = serde_json::from_reader(BufReader::new(input))?;

    if set.dim != expected_dim {
        return Err(EigError::VecIo(format!(
            "stored dimension {} does not match operator dimension {}",
            set.dim, expected_dim
        )));
    }
    for (i, v) in set.vectors.iter().enumerate() {
        if v.len() != set.dim {
            return Err(EigError::VecIo(format!(
                "vector {} has length {}, header says {}",
                i,
                v.len(),
                set.dim
            )));
        }
    }

    Ok(set
        .vectors
        .into_iter()
        .map(|v| v.into_iter().map(|x| T::from_f64(x).unwrap()).collect())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("krylov-eig-{}-{}", std::process::id(), name))
    }

    #[test]
    fn roundtrip_preserves_values() {
        let path = temp_path("roundtrip.json");
        let vectors = vec![vec![1.0f64, -2.5, 0.125], vec![0.0, 3.0, -4.0]];
        save_vectors(&vectors, &path).unwrap();
        let loaded: Vec<Vec<f64>> = load_vectors(&path, 3).unwrap();
        assert_eq!(loaded, vectors);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let path = temp_path("dim-mismatch.json");
        let vectors = vec![vec![1.0f64, 2.0]];
        save_vectors(&vectors, &path).unwrap();
        assert!(matches!(
            load_vectors::<f64, _>(&path, 3),
            Err(EigError::VecIo(_))
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_maps_to_vecio() {
        let path = temp_path("does-not-exist.json");
        assert!(matches!(
            load_vectors::<f64, _>(&path, 3),
            Err(EigError::VecIo(_))
        ));
    }
}
