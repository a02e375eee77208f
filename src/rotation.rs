// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file,
// You can obtain one at <https://mozilla.org/MPL/2.0/>.

// Optimal superposition of two weighted point sets.
//
// The rotation that best maps a set of centered points y onto a set of
// centered reference points r, in the weighted least-squares sense, is the
// unit quaternion given by the eigenvector of the largest eigenvalue of a
// 4x4 symmetric matrix built from the correlation matrix
//   C_ab = sum_j w_j * y_j,a * r_j,b
// (Horn's quaternion method). Unlike an SVD with sign fixing, the
// eigenvector always describes a proper rotation.
//
// Because the matrix is linear in every y_j, the derivative of the leading
// eigenvector follows from first-order perturbation theory:
//   dq = sum_{k>0} v_k * (v_k^T dF v_0) / (lambda_0 - lambda_k)
//
// Reference: B. K. P. Horn, "Closed-form solution of absolute orientation
// using unit quaternions", J. Opt. Soc. Am. A 4, 629 (1987).

use glam::f64::{DMat3, DQuat, DVec3};
use nalgebra::{Matrix4, SymmetricEigen, Vector4};

/// Eigenvalue gaps below this (relative to the leading eigenvalue) are
/// treated as degenerate and dropped from the derivative.
const DEGENERATE_GAP: f64 = 1.0e-12;

/// Row-major 3x3 matrix, used for the correlation and rotation derivatives.
type Rows3 = [[f64; 3]; 3];

/// Result of an optimal rotation solve, kept for computing derivatives.
#[derive(Debug, Clone)]
pub struct OptimalRotation {
    /// Components (q0, q1, q2, q3), scalar first, with q0 >= 0.
    q: [f64; 4],
    /// Eigenvalues sorted in decreasing order.
    eigenvalues: [f64; 4],
    /// Eigenvectors matching `eigenvalues`; `eigenvectors[0]` equals `q`.
    eigenvectors: [Vector4<f64>; 4],
    /// Weighted RMS deviation after superposition.
    rmsd: f64,
}

impl Default for OptimalRotation {
    fn default() -> Self {
        Self::identity()
    }
}

impl OptimalRotation {
    pub fn identity() -> Self {
        Self {
            q: [1.0, 0.0, 0.0, 0.0],
            eigenvalues: [0.0; 4],
            eigenvectors: [
                Vector4::new(1.0, 0.0, 0.0, 0.0),
                Vector4::new(0.0, 1.0, 0.0, 0.0),
                Vector4::new(0.0, 0.0, 1.0, 0.0),
                Vector4::new(0.0, 0.0, 0.0, 1.0),
            ],
            rmsd: 0.0,
        }
    }

    /// Solves for the rotation that maps `positions` onto `reference`.
    ///
    /// Both point sets must already be centered (with the same weights) and
    /// have the same length as `weights`.
    pub fn solve(positions: &[DVec3], reference: &[DVec3], weights: &[f64]) -> Self {
        debug_assert_eq!(positions.len(), reference.len());
        debug_assert_eq!(positions.len(), weights.len());

        let mut correlation: Rows3 = [[0.0; 3]; 3];
        for ((y, r), &w) in positions.iter().zip(reference.iter()).zip(weights.iter()) {
            let y = y.to_array();
            let r = r.to_array();
            for a in 0..3 {
                for b in 0..3 {
                    correlation[a][b] += w * y[a] * r[b];
                }
            }
        }

        let f = quaternion_matrix(&correlation);
        if f.norm() == 0.0 {
            // All points sit on their centroid: any rotation is optimal.
            log::debug!("Optimal rotation requested for a zero correlation matrix; using identity");
            return Self::identity();
        }

        let eigen = SymmetricEigen::new(f);

        // nalgebra doesn't sort the eigenvalues.
        let mut order = [0usize, 1, 2, 3];
        order.sort_by(|&i, &j| eigen.eigenvalues[j].total_cmp(&eigen.eigenvalues[i]));

        let eigenvalues = order.map(|i| eigen.eigenvalues[i]);
        let mut eigenvectors = order.map(|i| eigen.eigenvectors.column(i).into_owned());

        let mut leading = eigenvectors[0];
        leading /= leading.norm();
        if leading[0] < 0.0 {
            leading = -leading;
        }
        eigenvectors[0] = leading;

        if (eigenvalues[0] - eigenvalues[1]).abs() <= DEGENERATE_GAP * eigenvalues[0].abs().max(1.0) {
            log::debug!(
                "Degenerate leading eigenvalue in optimal rotation ({} vs {}); rotation is not unique",
                eigenvalues[0],
                eigenvalues[1]
            );
        }

        let mut rotation = Self {
            q: [leading[0], leading[1], leading[2], leading[3]],
            eigenvalues,
            eigenvectors,
            rmsd: 0.0,
        };
        rotation.rmsd = rotation.weighted_rmsd(positions, reference, weights);
        rotation
    }

    /// The rotation as a glam quaternion.
    pub fn quaternion(&self) -> DQuat {
        DQuat::from_xyzw(self.q[1], self.q[2], self.q[3], self.q[0])
    }

    /// Components (q0, q1, q2, q3), scalar first.
    pub fn components(&self) -> [f64; 4] {
        self.q
    }

    pub fn matrix(&self) -> DMat3 {
        DMat3::from_quat(self.quaternion())
    }

    pub fn eigenvalues(&self) -> [f64; 4] {
        self.eigenvalues
    }

    /// Weighted RMS deviation between the rotated positions and the reference.
    pub fn rmsd(&self) -> f64 {
        self.rmsd
    }

    pub fn rotate(&self, v: DVec3) -> DVec3 {
        self.quaternion() * v
    }

    /// Applies the inverse rotation (lab frame from fitted frame).
    pub fn inverse_rotate(&self, v: DVec3) -> DVec3 {
        self.quaternion().conjugate() * v
    }

    /// Derivatives of the quaternion components with respect to the x, y and z
    /// coordinates of one fitting atom, given its (centered) reference position
    /// and weight.
    pub fn quaternion_derivatives(&self, reference: DVec3, weight: f64) -> [[f64; 4]; 3] {
        let mut result = [[0.0; 4]; 3];
        let v0 = self.eigenvectors[0];
        let scale = self.eigenvalues[0].abs().max(1.0);
        let r = reference.to_array();

        for (a, dq_da) in result.iter_mut().enumerate() {
            // Only row `a` of the correlation matrix depends on this coordinate.
            let mut d_correlation: Rows3 = [[0.0; 3]; 3];
            for b in 0..3 {
                d_correlation[a][b] = weight * r[b];
            }
            let df_v0 = quaternion_matrix(&d_correlation) * v0;

            for k in 1..4 {
                let gap = self.eigenvalues[0] - self.eigenvalues[k];
                if gap.abs() <= DEGENERATE_GAP * scale {
                    continue;
                }
                let vk = &self.eigenvectors[k];
                let coeff = vk.dot(&df_v0) / gap;
                for c in 0..4 {
                    dq_da[c] += coeff * vk[c];
                }
            }
        }
        result
    }

    /// Derivatives of the rotation matrix with respect to q0..q3, as
    /// functions `v -> (dR/dq_k) v`.
    pub fn rotation_derivatives_times(&self, v: DVec3) -> [DVec3; 4] {
        let [q0, q1, q2, q3] = self.q;
        let d_r: [Rows3; 4] = [
            [[q0, -q3, q2], [q3, q0, -q1], [-q2, q1, q0]],
            [[q1, q2, q3], [q2, -q1, -q0], [q3, q0, -q1]],
            [[-q2, q1, q0], [q1, q2, q3], [-q0, q3, -q2]],
            [[-q3, -q0, q1], [q0, -q3, q2], [q1, q2, q3]],
        ];
        d_r.map(|m| 2.0 * mul_rows(&m, v))
    }

    fn weighted_rmsd(&self, positions: &[DVec3], reference: &[DVec3], weights: &[f64]) -> f64 {
        let rot = self.quaternion();
        let total_weight: f64 = weights.iter().sum();
        if total_weight <= 0.0 {
            return 0.0;
        }
        let msd = positions
            .iter()
            .zip(reference.iter())
            .zip(weights.iter())
            .map(|((&y, &r), &w)| w * (rot * y - r).length_squared())
            .sum::<f64>()
            / total_weight;
        msd.sqrt()
    }
}

/// Builds the 4x4 symmetric matrix whose leading eigenvector is the optimal
/// rotation quaternion, from a row-major correlation matrix.
fn quaternion_matrix(c: &Rows3) -> Matrix4<f64> {
    let [[xx, xy, xz], [yx, yy, yz], [zx, zy, zz]] = *c;
    Matrix4::new(
        xx + yy + zz, yz - zy, zx - xz, xy - yx,
        yz - zy, xx - yy - zz, xy + yx, zx + xz,
        zx - xz, xy + yx, -xx + yy - zz, yz + zy,
        xy - yx, zx + xz, yz + zy, -xx - yy + zz,
    )
}

#[inline]
fn mul_rows(m: &Rows3, v: DVec3) -> DVec3 {
    DVec3::new(
        m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
        m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
        m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
    )
}

// End of File
