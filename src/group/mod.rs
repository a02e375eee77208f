// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file,
// You can obtain one at <https://mozilla.org/MPL/2.0/>.

pub mod config;
pub mod fit;
pub mod forces;
pub mod registry;

use crate::atom::Atom;
use crate::error::{AtomGroupError, Result};
use crate::proxy::AtomProxy;
use crate::rotation::OptimalRotation;
use fit::{FitSettings, ReferenceFrame};
use glam::f64::{DQuat, DVec3};
use std::ops::{Index, IndexMut};

/// An ordered group of atom handles, treated as one unit by a collective
/// variable.
///
/// The order of the atoms is significant: explicit weights, reference
/// positions and externally supplied force or gradient arrays are all
/// parallel to it. The same atom id may appear more than once.
///
/// When centering or rotation is enabled, [`AtomGroup::read_positions`]
/// re-expresses the cached positions in the frame that best superimposes the
/// fitting atoms onto their reference positions; forces applied to the group
/// are rotated back into the lab frame before reaching the host.
#[derive(Debug, Clone)]
pub struct AtomGroup {
    atoms: Vec<Atom>,
    /// When set, the group stands in for this fixed point and has no atoms.
    dummy_position: Option<DVec3>,
    weights: Option<Vec<f64>>,
    total_mass: f64,
    total_weight: f64,
    sorted_ids: Vec<usize>,

    settings: FitSettings,
    frame: Option<ReferenceFrame>,
    rotation: OptimalRotation,

    no_force: bool,
    lab_positions: Vec<DVec3>,
    previous_positions: Vec<DVec3>,
}

impl AtomGroup {
    /// Builds a mass-weighted group from a list of atom handles.
    pub fn from_atoms(atoms: Vec<Atom>) -> Result<Self> {
        if atoms.is_empty() {
            return Err(AtomGroupError::EmptyGroup);
        }
        let mut group = Self {
            atoms,
            dummy_position: None,
            weights: None,
            total_mass: 0.0,
            total_weight: 0.0,
            sorted_ids: Vec::new(),
            settings: FitSettings::default(),
            frame: None,
            rotation: OptimalRotation::identity(),
            no_force: false,
            lab_positions: Vec::new(),
            previous_positions: Vec::new(),
        };
        group.update_totals()?;
        Ok(group)
    }

    /// Builds a group from 0-based topology ids, reading masses from the proxy.
    pub fn from_ids(proxy: &dyn AtomProxy, ids: &[usize]) -> Result<Self> {
        let atoms = ids
            .iter()
            .map(|&id| Atom::new(proxy, id))
            .collect::<Result<Vec<_>>>()?;
        Self::from_atoms(atoms)
    }

    /// Builds a dummy group standing in for a fixed point.
    pub fn dummy(position: DVec3) -> Self {
        Self {
            atoms: Vec::new(),
            dummy_position: Some(position),
            weights: None,
            total_mass: 0.0,
            total_weight: 0.0,
            sorted_ids: Vec::new(),
            settings: FitSettings::default(),
            frame: None,
            rotation: OptimalRotation::identity(),
            no_force: false,
            lab_positions: Vec::new(),
            previous_positions: Vec::new(),
        }
    }

    /// Replaces mass weighting with explicit per-atom weights.
    pub fn with_weights(mut self, weights: Vec<f64>) -> Result<Self> {
        self.require_atoms("with_weights")?;
        if weights.len() != self.atoms.len() {
            return Err(AtomGroupError::WeightCountMismatch {
                expected: self.atoms.len(),
                found: weights.len(),
            });
        }
        self.weights = Some(weights);
        self.update_totals()?;
        let self_weights = self.fit_weights_from_self();
        if let (Some(frame), Some(weights)) = (self.frame.as_mut(), self_weights) {
            if frame.is_self_fit() {
                frame.set_weights(weights);
            }
        }
        Ok(self)
    }

    /// Disables (or re-enables) force application on this group.
    pub fn with_no_force(mut self, no_force: bool) -> Self {
        self.no_force = no_force;
        self
    }

    // ------------------------------------------------------------------
    // Sequence access
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Atom> {
        self.atoms.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Atom> {
        self.atoms.iter_mut()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Mutable access to the handles; the group cannot be resized this way.
    pub fn atoms_mut(&mut self) -> &mut [Atom] {
        &mut self.atoms
    }

    /// Appends a handle to a mass-weighted group.
    ///
    /// The handle's `pos` is taken as its lab-frame position. Once positions
    /// have been read, it joins the lab positions used by the fit gradients
    /// and is moved into the fitted frame like the other members.
    pub fn add_atom(&mut self, atom: Atom) -> Result<()> {
        self.check_resizable("add_atom")?;
        if let Some(weights) = &self.weights {
            return Err(AtomGroupError::WeightCountMismatch {
                expected: self.atoms.len() + 1,
                found: weights.len(),
            });
        }
        self.total_mass += atom.mass;
        self.total_weight += atom.mass;
        self.push_atom(atom);
        Ok(())
    }

    /// Appends a handle with an explicit weight to an explicitly weighted
    /// group; positions are handled as in [`AtomGroup::add_atom`].
    pub fn add_weighted_atom(&mut self, atom: Atom, weight: f64) -> Result<()> {
        self.check_resizable("add_weighted_atom")?;
        let Some(weights) = self.weights.as_mut() else {
            return Err(AtomGroupError::WeightCountMismatch {
                expected: 0,
                found: self.atoms.len() + 1,
            });
        };
        weights.push(weight);
        self.total_mass += atom.mass;
        self.total_weight += weight;
        self.push_atom(atom);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    pub fn is_dummy(&self) -> bool {
        self.dummy_position.is_some()
    }

    pub fn dummy_position(&self) -> Option<DVec3> {
        self.dummy_position
    }

    pub fn total_mass(&self) -> f64 {
        self.total_mass
    }

    /// Sum of the explicit weights, or the total mass for a mass-weighted group.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    /// Weight of atom `i`: its explicit weight, or its mass.
    #[inline]
    pub fn weight(&self, i: usize) -> f64 {
        match &self.weights {
            Some(weights) => weights[i],
            None => self.atoms[i].mass,
        }
    }

    pub fn no_force(&self) -> bool {
        self.no_force
    }

    pub fn set_no_force(&mut self, no_force: bool) {
        self.no_force = no_force;
    }

    /// Sorted list of the distinct atom ids, built on demand.
    pub fn create_sorted_ids(&mut self) -> Result<&[usize]> {
        self.require_atoms("create_sorted_ids")?;
        if self.sorted_ids.is_empty() {
            let mut ids: Vec<usize> = self.atoms.iter().map(|a| a.id).collect();
            ids.sort_unstable();
            ids.dedup();
            self.sorted_ids = ids;
        }
        Ok(&self.sorted_ids)
    }

    /// Sorted ids, if [`AtomGroup::create_sorted_ids`] has been called.
    pub fn sorted_ids(&self) -> Option<&[usize]> {
        (!self.sorted_ids.is_empty()).then_some(self.sorted_ids.as_slice())
    }

    // ------------------------------------------------------------------
    // Reading data from the host
    // ------------------------------------------------------------------

    /// Refreshes masses from the host and recomputes the totals.
    ///
    /// Needed when the host changes masses after the group was built. The
    /// reference positions are re-centered with the new weights. When the new
    /// masses are rejected the group is left unchanged.
    pub fn update_masses(&mut self, proxy: &dyn AtomProxy) -> Result<()> {
        if self.is_dummy() {
            return Ok(());
        }
        let masses: Vec<f64> = self
            .atoms
            .iter()
            .map(|a| proxy.atom_mass(a.index()))
            .collect();
        let total_mass: f64 = masses.iter().sum();
        let total_weight = match &self.weights {
            Some(weights) => weights.iter().sum(),
            None => total_mass,
        };
        check_totals(total_mass, total_weight)?;

        if let Some(frame) = self.frame.as_mut() {
            if !frame.is_self_fit() {
                frame.update_external_masses(proxy)?;
            }
        }
        for (atom, &mass) in self.atoms.iter_mut().zip(masses.iter()) {
            atom.mass = mass;
        }
        self.total_mass = total_mass;
        self.total_weight = total_weight;

        let self_weights = self.fit_weights_from_self();
        if let Some(frame) = self.frame.as_mut() {
            match self_weights {
                Some(weights) if frame.is_self_fit() => frame.set_weights(weights),
                _ => frame.recenter_reference(),
            }
        }
        log::debug!(
            "Updated masses of a group of {} atoms: total mass {}",
            self.atoms.len(),
            self.total_mass
        );
        Ok(())
    }

    /// Reads the current positions; when centering or rotation is enabled,
    /// the positions are then moved into the fitted frame.
    pub fn read_positions(&mut self, proxy: &dyn AtomProxy) {
        if self.is_dummy() {
            return;
        }
        std::mem::swap(&mut self.previous_positions, &mut self.lab_positions);
        self.lab_positions.clear();
        for atom in self.atoms.iter_mut() {
            atom.read_position(proxy);
            self.lab_positions.push(atom.pos);
        }
        if self.settings.is_fitting() {
            self.calc_apply_roto_translation(proxy);
        }
    }

    /// Reads the current velocities; must follow [`AtomGroup::read_positions`]
    /// so that the same rotation is used.
    pub fn read_velocities(&mut self, proxy: &dyn AtomProxy) {
        if self.is_dummy() {
            return;
        }
        let rotation = self.settings.rotate.then(|| self.rotation.quaternion());
        for atom in self.atoms.iter_mut() {
            atom.read_velocity(proxy);
            if let Some(q) = rotation {
                atom.vel = q * atom.vel;
            }
        }
    }

    /// Reads the system forces of the previous step; must follow
    /// [`AtomGroup::read_positions`] so that the same rotation is used.
    pub fn read_system_forces(&mut self, proxy: &dyn AtomProxy) {
        if self.is_dummy() {
            return;
        }
        let rotation = self.settings.rotate.then(|| self.rotation.quaternion());
        for atom in self.atoms.iter_mut() {
            atom.read_system_force(proxy);
            if let Some(q) = rotation {
                atom.system_force = q * atom.system_force;
            }
        }
    }

    /// Resets position, velocity, force and gradient of every handle,
    /// including the handles onto an external fitting group.
    pub fn reset_atoms_data(&mut self) {
        for atom in self.atoms.iter_mut() {
            atom.reset_data();
        }
        if let Some(frame) = self.frame.as_mut() {
            frame.reset_external_atoms();
        }
    }

    // ------------------------------------------------------------------
    // Geometric queries
    // ------------------------------------------------------------------

    /// Copy of the current positions, in member order.
    pub fn positions(&self) -> Result<Vec<DVec3>> {
        self.require_atoms("positions")?;
        Ok(self.atoms.iter().map(|a| a.pos).collect())
    }

    /// Copy of the current positions, each shifted by `shift`.
    pub fn positions_shifted(&self, shift: DVec3) -> Result<Vec<DVec3>> {
        self.require_atoms("positions_shifted")?;
        Ok(self.atoms.iter().map(|a| a.pos + shift).collect())
    }

    pub fn velocities(&self) -> Result<Vec<DVec3>> {
        self.require_atoms("velocities")?;
        Ok(self.atoms.iter().map(|a| a.vel).collect())
    }

    pub fn system_forces(&self) -> Result<Vec<DVec3>> {
        self.require_atoms("system_forces")?;
        Ok(self.atoms.iter().map(|a| a.system_force).collect())
    }

    /// Sum of the system forces over the group.
    pub fn system_force(&self) -> Result<DVec3> {
        self.require_atoms("system_force")?;
        Ok(self.atoms.iter().map(|a| a.system_force).sum())
    }

    /// Unweighted mean of the positions; no periodic wrapping is applied.
    pub fn center_of_geometry(&self) -> DVec3 {
        if let Some(position) = self.dummy_position {
            return position;
        }
        let sum: DVec3 = self.atoms.iter().map(|a| a.pos).sum();
        sum / self.atoms.len() as f64
    }

    /// Mass-weighted mean of the positions; no periodic wrapping is applied.
    pub fn center_of_mass(&self) -> DVec3 {
        if let Some(position) = self.dummy_position {
            return position;
        }
        let sum: DVec3 = self.atoms.iter().map(|a| a.mass * a.pos).sum();
        sum / self.total_mass
    }

    /// Lab-frame positions captured by the previous [`AtomGroup::read_positions`].
    pub fn previous_positions(&self) -> Option<&[DVec3]> {
        (!self.previous_positions.is_empty()).then_some(self.previous_positions.as_slice())
    }

    /// Lab-frame positions captured by the latest [`AtomGroup::read_positions`].
    pub fn lab_positions(&self) -> &[DVec3] {
        &self.lab_positions
    }

    // ------------------------------------------------------------------
    // Gradients
    // ------------------------------------------------------------------

    /// Sets every atom's gradient to `grad` scaled by its share of the total
    /// mass, as for a quantity computed from the center of mass.
    pub fn set_weighted_gradient(&mut self, grad: DVec3) {
        let total_mass = self.total_mass;
        for atom in self.atoms.iter_mut() {
            atom.grad = (atom.mass / total_mass) * grad;
        }
    }

    /// Copies per-atom gradients (with respect to the current, possibly
    /// fitted, positions) into the handles.
    pub fn set_gradients(&mut self, gradients: &[DVec3]) -> Result<()> {
        self.require_atoms("set_gradients")?;
        if gradients.len() != self.atoms.len() {
            return Err(AtomGroupError::GradientCountMismatch {
                expected: self.atoms.len(),
                found: gradients.len(),
            });
        }
        for (atom, &g) in self.atoms.iter_mut().zip(gradients.iter()) {
            atom.grad = g;
        }
        Ok(())
    }

    pub fn gradients(&self) -> Vec<DVec3> {
        self.atoms.iter().map(|a| a.grad).collect()
    }

    // ------------------------------------------------------------------
    // Rigid moves of the cached positions
    // ------------------------------------------------------------------

    pub fn apply_translation(&mut self, t: DVec3) {
        for atom in self.atoms.iter_mut() {
            atom.pos += t;
        }
    }

    pub fn apply_rotation(&mut self, q: DQuat) {
        for atom in self.atoms.iter_mut() {
            atom.pos = q * atom.pos;
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn require_atoms(&self, operation: &'static str) -> Result<()> {
        if self.is_dummy() {
            Err(AtomGroupError::DummyGroup { operation })
        } else {
            Ok(())
        }
    }

    fn check_resizable(&self, operation: &'static str) -> Result<()> {
        self.require_atoms(operation)?;
        match &self.frame {
            Some(frame) if frame.is_self_fit() => Err(AtomGroupError::CannotResizeFittedGroup),
            _ => Ok(()),
        }
    }

    fn push_atom(&mut self, mut atom: Atom) {
        if !self.lab_positions.is_empty() && self.lab_positions.len() == self.atoms.len() {
            self.lab_positions.push(atom.pos);
            atom.pos = self.to_fitted_frame(atom.pos);
        }
        self.atoms.push(atom);
        self.sorted_ids.clear();
    }

    fn update_totals(&mut self) -> Result<()> {
        self.total_mass = self.atoms.iter().map(|a| a.mass).sum();
        self.total_weight = match &self.weights {
            Some(weights) => weights.iter().sum(),
            None => self.total_mass,
        };
        check_totals(self.total_mass, self.total_weight)
    }

    /// Weights of this group's own atoms, as used when it fits against itself.
    fn fit_weights_from_self(&self) -> Option<Vec<f64>> {
        if self.is_dummy() {
            return None;
        }
        Some((0..self.atoms.len()).map(|i| self.weight(i)).collect())
    }
}

fn check_totals(total_mass: f64, total_weight: f64) -> Result<()> {
    if !(total_mass > 0.0) {
        return Err(AtomGroupError::NonPositiveTotalMass { total: total_mass });
    }
    if !(total_weight > 0.0) {
        return Err(AtomGroupError::NonPositiveTotalWeight {
            total: total_weight,
        });
    }
    Ok(())
}

impl Index<usize> for AtomGroup {
    type Output = Atom;

    fn index(&self, i: usize) -> &Atom {
        &self.atoms[i]
    }
}

impl IndexMut<usize> for AtomGroup {
    fn index_mut(&mut self, i: usize) -> &mut Atom {
        &mut self.atoms[i]
    }
}

impl<'a> IntoIterator for &'a AtomGroup {
    type Item = &'a Atom;
    type IntoIter = std::slice::Iter<'a, Atom>;

    fn into_iter(self) -> Self::IntoIter {
        self.atoms.iter()
    }
}

// End of File
