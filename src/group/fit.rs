// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file,
// You can obtain one at <https://mozilla.org/MPL/2.0/>.

// Reference-frame fitting of an atom group.
//
// The fitting atoms (the group itself, or the atoms of another group) are
// centered on their weighted centroid c and rotated by the optimal rotation R
// onto the stored reference positions r_j, which are kept centered on zero.
// The group's cached positions then become
//   p_i = R (x_i - c) + c_ref    when centering,
//   p_i = R x_i                  when only rotating,
// i.e. with centering the fitted group sits at the absolute reference
// placement.
//
// A scalar computed from the p_i depends on the lab positions both directly
// and through c and R. The direct part is handled when forces are applied
// (rotating each gradient back by R^T); the indirect part is stored per
// fitting atom in `fit_gradients`:
//   fit_gradients[j] = -(w_j / W) R^T sum_i g_i
//                    + sum_k G_k dq_k/dy_j,   G_k = sum_i g_i . (dR/dq_k)(x_i - c)

use super::AtomGroup;
use super::registry::GroupId;
use crate::atom::Atom;
use crate::error::{AtomGroupError, Result};
use crate::proxy::AtomProxy;
use crate::rotation::OptimalRotation;
use glam::f64::{DMat3, DQuat, DVec3};

/// Options controlling how an atom group is fitted onto its reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitSettings {
    /// Translate the positions so the fitting atoms' centroid matches the reference centroid.
    pub center: bool,
    /// Rotate the positions onto the reference (after centering, if enabled).
    pub rotate: bool,
    /// Include the derivatives of the roto-translation in the applied forces.
    pub fit_gradients: bool,
    /// The fit was chosen explicitly and must not be overridden by defaults.
    pub user_defined: bool,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            center: false,
            rotate: false,
            fit_gradients: true,
            user_defined: false,
        }
    }
}

impl FitSettings {
    #[inline]
    pub fn is_fitting(&self) -> bool {
        self.center || self.rotate
    }
}

/// Reference configuration and per-step fit state of a group.
#[derive(Debug, Clone)]
pub(crate) struct ReferenceFrame {
    /// Group that defines the transform; `None` when it is the group itself.
    group: Option<GroupId>,
    /// Handles onto the fitting group's atoms (empty when fitting on self).
    external_atoms: Vec<Atom>,
    /// Explicit weights of the external fitting group, if it has any.
    external_weights: Option<Vec<f64>>,
    /// Weights of the fitting atoms.
    weights: Vec<f64>,
    /// Reference positions, centered on their weighted centroid.
    positions: Vec<DVec3>,
    centroid: DVec3,

    /// Current fitting-atom positions minus `current_centroid`.
    centered: Vec<DVec3>,
    current_centroid: DVec3,
    fit_gradients: Vec<DVec3>,
}

impl ReferenceFrame {
    fn new(
        group: Option<GroupId>,
        external_atoms: Vec<Atom>,
        external_weights: Option<Vec<f64>>,
        weights: Vec<f64>,
        reference: Vec<DVec3>,
    ) -> Self {
        let mut frame = Self {
            group,
            external_atoms,
            external_weights,
            weights,
            positions: reference,
            centroid: DVec3::ZERO,
            centered: Vec::new(),
            current_centroid: DVec3::ZERO,
            fit_gradients: Vec::new(),
        };
        frame.recenter_reference();
        frame
    }

    #[inline]
    pub(crate) fn is_self_fit(&self) -> bool {
        self.external_atoms.is_empty()
    }

    pub(crate) fn external_atoms(&self) -> &[Atom] {
        &self.external_atoms
    }

    pub(crate) fn fit_gradients(&self) -> &[DVec3] {
        &self.fit_gradients
    }

    pub(crate) fn set_weights(&mut self, weights: Vec<f64>) {
        debug_assert_eq!(weights.len(), self.positions.len());
        self.weights = weights;
        self.recenter_reference();
    }

    /// Refreshes the masses of the external fitting atoms. Nothing changes
    /// when the new total mass is not positive.
    pub(crate) fn update_external_masses(&mut self, proxy: &dyn AtomProxy) -> Result<()> {
        let masses: Vec<f64> = self
            .external_atoms
            .iter()
            .map(|a| proxy.atom_mass(a.index()))
            .collect();
        let total: f64 = masses.iter().sum();
        if !(total > 0.0) {
            return Err(AtomGroupError::NonPositiveTotalMass { total });
        }
        for (atom, &mass) in self.external_atoms.iter_mut().zip(masses.iter()) {
            atom.mass = mass;
        }
        if self.external_weights.is_none() {
            self.weights = masses;
        }
        Ok(())
    }

    pub(crate) fn reset_external_atoms(&mut self) {
        for atom in self.external_atoms.iter_mut() {
            atom.reset_data();
        }
    }

    /// Re-centers the reference positions on their weighted centroid, keeping
    /// their absolute placement in `centroid`.
    pub(crate) fn recenter_reference(&mut self) {
        let total: f64 = self.weights.iter().sum();
        let absolute: Vec<DVec3> = self.positions.iter().map(|&r| r + self.centroid).collect();
        self.centroid = if total > 0.0 {
            absolute
                .iter()
                .zip(self.weights.iter())
                .map(|(&r, &w)| w * r)
                .sum::<DVec3>()
                / total
        } else {
            DVec3::ZERO
        };
        self.positions = absolute.into_iter().map(|r| r - self.centroid).collect();
    }
}

impl AtomGroup {
    /// Attaches reference positions (absolute coordinates, one per atom of
    /// this group) and fits the group onto them according to `settings`.
    pub fn with_reference(mut self, reference: Vec<DVec3>, settings: FitSettings) -> Result<Self> {
        self.require_atoms("with_reference")?;
        if reference.len() != self.atoms.len() {
            return Err(AtomGroupError::ReferenceCountMismatch {
                expected: self.atoms.len(),
                found: reference.len(),
            });
        }
        let weights = self.fit_weights_from_self().unwrap_or_default();
        self.frame = Some(ReferenceFrame::new(None, Vec::new(), None, weights, reference));
        self.settings = settings;
        Ok(self)
    }

    /// Fits this group with the transform that superimposes the atoms of
    /// `fitting` (registered as `id`) onto `reference`, one position per
    /// atom of `fitting`.
    pub fn with_fitting_group(
        mut self,
        id: GroupId,
        fitting: &AtomGroup,
        reference: Vec<DVec3>,
        settings: FitSettings,
    ) -> Result<Self> {
        self.require_atoms("with_fitting_group")?;
        fitting.require_atoms("with_fitting_group")?;
        if reference.len() != fitting.len() {
            return Err(AtomGroupError::ReferenceCountMismatch {
                expected: fitting.len(),
                found: reference.len(),
            });
        }
        let weights = fitting.fit_weights_from_self().unwrap_or_default();
        self.frame = Some(ReferenceFrame::new(
            Some(id),
            fitting.atoms.clone(),
            fitting.weights.clone(),
            weights,
            reference,
        ));
        self.settings = settings;
        Ok(self)
    }

    pub fn fit_settings(&self) -> FitSettings {
        self.settings
    }

    /// Enables or disables the fit-gradient contribution.
    pub fn set_fit_gradients(&mut self, enabled: bool) {
        self.settings.fit_gradients = enabled;
    }

    /// Requests a centering/rotation default, e.g. from a collective variable
    /// that needs a fitted frame. Ignored when the user chose the fit
    /// explicitly.
    pub fn set_default_fit(&mut self, center: bool, rotate: bool) -> Result<()> {
        if self.settings.user_defined {
            log::debug!("Keeping user-defined fit settings {:?}", self.settings);
            return Ok(());
        }
        if (center || rotate) && self.frame.is_none() {
            return Err(AtomGroupError::MissingReferencePositions);
        }
        self.settings.center = center;
        self.settings.rotate = rotate;
        Ok(())
    }

    /// Id of the group defining the transform; `None` when it is this group.
    pub fn fitting_group(&self) -> Option<GroupId> {
        self.frame.as_ref().and_then(|f| f.group)
    }

    /// Handles onto the atoms of an external fitting group.
    pub fn fitting_atoms(&self) -> &[Atom] {
        self.frame
            .as_ref()
            .map(|f| f.external_atoms.as_slice())
            .unwrap_or(&[])
    }

    /// Reference positions, centered on zero.
    pub fn reference_positions(&self) -> Option<&[DVec3]> {
        self.frame.as_ref().map(|f| f.positions.as_slice())
    }

    /// Centroid removed from the reference positions when they were stored.
    pub fn reference_centroid(&self) -> Option<DVec3> {
        self.frame.as_ref().map(|f| f.centroid)
    }

    /// Centroid of the fitting atoms found by the latest fit (zero when not centering).
    pub fn fit_centroid(&self) -> DVec3 {
        self.frame.as_ref().map_or(DVec3::ZERO, |f| f.current_centroid)
    }

    /// The latest optimal rotation (identity when rotation is disabled).
    pub fn rotation(&self) -> &OptimalRotation {
        &self.rotation
    }

    pub fn rotation_matrix(&self) -> DMat3 {
        self.rotation.matrix()
    }

    /// Weighted RMS deviation of the fitting atoms from the reference after the latest fit.
    pub fn fit_rmsd(&self) -> Option<f64> {
        let frame = self.frame.as_ref()?;
        if frame.centered.is_empty() {
            return None;
        }
        let q = self.rotation.quaternion();
        let total: f64 = frame.weights.iter().sum();
        let msd = frame
            .centered
            .iter()
            .zip(frame.positions.iter())
            .zip(frame.weights.iter())
            .map(|((&y, &r), &w)| w * (q * y - r).length_squared())
            .sum::<f64>()
            / total;
        Some(msd.sqrt())
    }

    /// Derivatives of the fitting transform, one per fitting atom, valid after
    /// [`AtomGroup::calc_fit_gradients`].
    pub fn fit_gradients(&self) -> &[DVec3] {
        self.frame
            .as_ref()
            .map(|f| f.fit_gradients.as_slice())
            .unwrap_or(&[])
    }

    /// Computes the optimal roto-translation from the fitting atoms' current
    /// positions and applies it to this group's cached positions.
    ///
    /// Expects the group's positions to have just been read; the positions of
    /// an external fitting group are read here.
    pub fn calc_apply_roto_translation(&mut self, proxy: &dyn AtomProxy) {
        let settings = self.settings;
        let Some(frame) = self.frame.as_mut() else {
            return;
        };

        frame.centered.clear();
        if frame.is_self_fit() {
            frame.centered.extend(self.atoms.iter().map(|a| a.pos));
        } else {
            for atom in frame.external_atoms.iter_mut() {
                atom.read_position(proxy);
                frame.centered.push(atom.pos);
            }
        }

        frame.current_centroid = if settings.center {
            let total: f64 = frame.weights.iter().sum();
            frame
                .centered
                .iter()
                .zip(frame.weights.iter())
                .map(|(&y, &w)| w * y)
                .sum::<DVec3>()
                / total
        } else {
            DVec3::ZERO
        };
        let centroid = frame.current_centroid;
        for y in frame.centered.iter_mut() {
            *y -= centroid;
        }

        self.rotation = if settings.rotate {
            OptimalRotation::solve(&frame.centered, &frame.positions, &frame.weights)
        } else {
            OptimalRotation::identity()
        };
        let reference_centroid = frame.centroid;

        if settings.center {
            self.apply_translation(-centroid);
        }
        if settings.rotate {
            let q = self.rotation.quaternion();
            self.apply_rotation(q);
        }
        if settings.center {
            self.apply_translation(reference_centroid);
        }
    }

    /// Computes the derivatives of the fitting transform given the current
    /// per-atom gradients (taken with respect to the fitted positions).
    ///
    /// Does nothing unless fit gradients are enabled and the group is fitted.
    pub fn calc_fit_gradients(&mut self) {
        let settings = self.settings;
        if !settings.fit_gradients || !settings.is_fitting() {
            return;
        }
        let Some(frame) = self.frame.as_mut() else {
            return;
        };

        let n_fit = frame.positions.len();
        frame.fit_gradients.clear();
        frame.fit_gradients.resize(n_fit, DVec3::ZERO);
        if frame.centered.len() != n_fit {
            // No fit has been computed yet.
            return;
        }

        if settings.center {
            let total: f64 = frame.weights.iter().sum();
            let grad_sum: DVec3 = self.atoms.iter().map(|a| a.grad).sum();
            let lab_grad_sum = self.rotation.inverse_rotate(grad_sum);
            for (fg, &w) in frame.fit_gradients.iter_mut().zip(frame.weights.iter()) {
                *fg -= (w / total) * lab_grad_sum;
            }
        }

        if settings.rotate {
            // G_k = sum_i g_i . (dR/dq_k)(x_i - c)
            let centroid = frame.current_centroid;
            let mut g_q = [0.0; 4];
            for (atom, &x) in self.atoms.iter().zip(self.lab_positions.iter()) {
                let d_r = self.rotation.rotation_derivatives_times(x - centroid);
                for k in 0..4 {
                    g_q[k] += atom.grad.dot(d_r[k]);
                }
            }

            for ((fg, &r), &w) in frame
                .fit_gradients
                .iter_mut()
                .zip(frame.positions.iter())
                .zip(frame.weights.iter())
            {
                let dq = self.rotation.quaternion_derivatives(r, w);
                let component = |a: usize| (0..4).map(|k| g_q[k] * dq[a][k]).sum::<f64>();
                *fg += DVec3::new(component(0), component(1), component(2));
            }
        }
    }

    /// Maps a lab-frame position with the latest roto-translation.
    pub(crate) fn to_fitted_frame(&self, x: DVec3) -> DVec3 {
        let Some(frame) = self.frame.as_ref() else {
            return x;
        };
        if !self.settings.is_fitting() || frame.centered.is_empty() {
            return x;
        }
        let mut p = x;
        if self.settings.center {
            p -= frame.current_centroid;
        }
        if self.settings.rotate {
            p = self.rotation.rotate(p);
        }
        if self.settings.center {
            p += frame.centroid;
        }
        p
    }

    /// Rotates a fitted-frame vector back into the lab frame.
    #[inline]
    pub(crate) fn to_lab_frame(&self, v: DVec3) -> DVec3 {
        if self.settings.rotate {
            self.rotation.inverse_rotate(v)
        } else {
            v
        }
    }

    /// The rotation applied to the cached positions, as a quaternion.
    pub fn fit_quaternion(&self) -> DQuat {
        self.rotation.quaternion()
    }
}

// End of File
