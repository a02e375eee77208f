// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file,
// You can obtain one at <https://mozilla.org/MPL/2.0/>.

// Propagation of forces from a collective variable back onto the atoms.
//
// Forces handed to a group are expressed in the group's (possibly fitted)
// frame. They reach the host rotated back by R^T, and all three entry points
// only ever add to the host force buffer.

use super::AtomGroup;
use crate::error::{AtomGroupError, Result};
use crate::proxy::AtomProxy;
use glam::f64::DVec3;

impl AtomGroup {
    /// Applies the force of a scalar collective variable, `force * grad_i`, to
    /// every atom.
    ///
    /// With fit gradients enabled on a fitted group, the derivatives of the
    /// roto-translation are recomputed from the current gradients and their
    /// force is added to the fitting atoms as well.
    pub fn apply_colvar_force(&mut self, proxy: &mut dyn AtomProxy, force: f64) {
        if self.no_force {
            return;
        }
        if self.is_dummy() {
            log::debug!("Ignoring colvar force {force} on a dummy group");
            return;
        }

        for atom in self.atoms.iter() {
            atom.apply_force(proxy, self.to_lab_frame(force * atom.grad));
        }

        if self.settings.fit_gradients && self.settings.is_fitting() {
            self.calc_fit_gradients();
            let Some(frame) = self.frame.as_ref() else {
                return;
            };
            let fitting_atoms = if frame.is_self_fit() {
                self.atoms.as_slice()
            } else {
                frame.external_atoms()
            };
            for (atom, &fg) in fitting_atoms.iter().zip(frame.fit_gradients().iter()) {
                atom.apply_force(proxy, force * fg);
            }
        }
    }

    /// Applies a force to the group as a whole, shared among the atoms in
    /// proportion to their weights (masses unless explicit weights are set).
    pub fn apply_force(&self, proxy: &mut dyn AtomProxy, force: DVec3) {
        if self.no_force {
            return;
        }
        if self.is_dummy() {
            log::debug!("Ignoring force {force} on a dummy group");
            return;
        }

        let lab_force = self.to_lab_frame(force);
        for (i, atom) in self.atoms.iter().enumerate() {
            atom.apply_force(proxy, (self.weight(i) / self.total_weight) * lab_force);
        }
    }

    /// Applies one force per atom, in member order, without any weighting.
    pub fn apply_forces(&self, proxy: &mut dyn AtomProxy, forces: &[DVec3]) -> Result<()> {
        self.require_atoms("apply_forces")?;
        if forces.len() != self.atoms.len() {
            return Err(AtomGroupError::ForceCountMismatch {
                expected: self.atoms.len(),
                found: forces.len(),
            });
        }
        if self.no_force {
            return Ok(());
        }

        for (atom, &f) in self.atoms.iter().zip(forces.iter()) {
            atom.apply_force(proxy, self.to_lab_frame(f));
        }
        Ok(())
    }
}

// End of File
