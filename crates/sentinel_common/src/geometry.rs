//! Sphere geometry for basin vectors.
//!
//! Basin positions are unit-norm vectors of a fixed system-wide dimension.
//! Distance between two positions is the geodesic arc length on the unit
//! sphere, which is what the drift checks in the health monitor consume.

use crate::snapshot::Regime;

/// Fixed dimension of every basin vector in the system.
pub const BASIN_DIM: usize = 64;

/// Regime breakpoints on phi.
pub const LINEAR_THRESHOLD: f64 = 0.3;
pub const BREAKDOWN_THRESHOLD: f64 = 0.7;

/// Normalize a basin vector to unit length.
///
/// Invalid input (wrong dimension, non-finite entries, or zero norm) is
/// replaced with the canonical basis vector `e0` rather than surfaced as a
/// fault; the monitor must never drop a capture over a bad vector.
pub fn normalize_basin(basin: &[f64]) -> Vec<f64> {
    if basin.len() != BASIN_DIM || basin.iter().any(|v| !v.is_finite()) {
        return canonical_basin();
    }

    let norm = basin.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm <= f64::EPSILON {
        return canonical_basin();
    }

    basin.iter().map(|v| v / norm).collect()
}

/// The canonical unit vector `e0`, used as the fallback basin position.
pub fn canonical_basin() -> Vec<f64> {
    let mut basin = vec![0.0; BASIN_DIM];
    basin[0] = 1.0;
    basin
}

/// Geodesic distance between two unit vectors: arccos of the clipped dot
/// product. Symmetric, zero for identical vectors, pi for antipodes.
pub fn geodesic_distance(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot.clamp(-1.0, 1.0).acos()
}

/// Classify the processing regime from phi.
pub fn classify_regime(phi: f64) -> Regime {
    if phi < LINEAR_THRESHOLD {
        Regime::Linear
    } else if phi < BREAKDOWN_THRESHOLD {
        Regime::Geometric
    } else {
        Regime::Breakdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit(seed: u64) -> Vec<f64> {
        // Deterministic pseudo-random unit vector (xorshift).
        let mut state = seed.max(1);
        let raw: Vec<f64> = (0..BASIN_DIM)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state as f64 / u64::MAX as f64) - 0.5
            })
            .collect();
        normalize_basin(&raw)
    }

    #[test]
    fn distance_to_self_is_zero() {
        let a = unit(7);
        assert_relative_eq!(geodesic_distance(&a, &a), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = unit(7);
        let b = unit(19);
        assert_relative_eq!(
            geodesic_distance(&a, &b),
            geodesic_distance(&b, &a),
            epsilon = 1e-12
        );
    }

    #[test]
    fn distance_to_antipode_is_pi() {
        let a = unit(42);
        let neg: Vec<f64> = a.iter().map(|v| -v).collect();
        assert_relative_eq!(
            geodesic_distance(&a, &neg),
            std::f64::consts::PI,
            epsilon = 1e-6
        );
    }

    #[test]
    fn zero_vector_falls_back_to_canonical() {
        let basin = normalize_basin(&vec![0.0; BASIN_DIM]);
        assert_eq!(basin, canonical_basin());
    }

    #[test]
    fn wrong_dimension_falls_back_to_canonical() {
        assert_eq!(normalize_basin(&[1.0, 2.0]), canonical_basin());
    }

    #[test]
    fn non_finite_entry_falls_back_to_canonical() {
        let mut basin = vec![1.0; BASIN_DIM];
        basin[3] = f64::NAN;
        assert_eq!(normalize_basin(&basin), canonical_basin());
    }

    #[test]
    fn normalized_vector_has_unit_norm() {
        let basin = normalize_basin(&vec![2.0; BASIN_DIM]);
        let norm: f64 = basin.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn regime_breakpoints() {
        assert_eq!(classify_regime(0.2), Regime::Linear);
        assert_eq!(classify_regime(0.5), Regime::Geometric);
        assert_eq!(classify_regime(0.8), Regime::Breakdown);
        // Boundary values land on the upper side.
        assert_eq!(classify_regime(0.3), Regime::Geometric);
        assert_eq!(classify_regime(0.7), Regime::Breakdown);
    }
}
