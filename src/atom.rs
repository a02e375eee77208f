// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file,
// You can obtain one at <https://mozilla.org/MPL/2.0/>.

use crate::error::{AtomGroupError, Result};
use crate::proxy::{AtomProxy, ProxyIndex};
use glam::f64::DVec3;

/// Handle onto one simulated atom, with cached per-step data.
///
/// Several handles may refer to the same atom id, in the same or in
/// different groups. They act independently: forces applied through each of
/// them are summed by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    index: ProxyIndex,
    /// 0-based identifier in the host topology.
    pub id: usize,
    pub mass: f64,
    /// Current position; lab frame after a read, fitted frame after a fit.
    pub pos: DVec3,
    pub vel: DVec3,
    /// System force at the previous step.
    pub system_force: DVec3,
    /// Gradient of a scalar collective variable with respect to this atom.
    pub grad: DVec3,
}

impl Atom {
    /// Creates a handle for the atom with the given topology id and reads its mass.
    pub fn new(proxy: &dyn AtomProxy, id: usize) -> Result<Self> {
        let index = proxy
            .atom_index(id)
            .ok_or(AtomGroupError::UnknownAtom { id })?;
        let mut atom = Self::with_index(index, id);
        atom.update_mass(proxy);
        Ok(atom)
    }

    /// Creates a handle from an already resolved proxy index. The mass is zero
    /// until [`Atom::update_mass`] is called.
    pub fn with_index(index: ProxyIndex, id: usize) -> Self {
        Self {
            index,
            id,
            mass: 0.0,
            pos: DVec3::ZERO,
            vel: DVec3::ZERO,
            system_force: DVec3::ZERO,
            grad: DVec3::ZERO,
        }
    }

    #[inline]
    pub fn index(&self) -> ProxyIndex {
        self.index
    }

    /// Zeroes position, velocity, system force and gradient; keeps id and mass.
    #[inline]
    pub fn reset_data(&mut self) {
        self.pos = DVec3::ZERO;
        self.vel = DVec3::ZERO;
        self.system_force = DVec3::ZERO;
        self.grad = DVec3::ZERO;
    }

    #[inline]
    pub fn update_mass(&mut self, proxy: &dyn AtomProxy) {
        self.mass = proxy.atom_mass(self.index);
    }

    #[inline]
    pub fn read_position(&mut self, proxy: &dyn AtomProxy) {
        self.pos = proxy.atom_position(self.index);
    }

    #[inline]
    pub fn read_velocity(&mut self, proxy: &dyn AtomProxy) {
        self.vel = proxy.atom_velocity(self.index);
    }

    #[inline]
    pub fn read_system_force(&mut self, proxy: &dyn AtomProxy) {
        self.system_force = proxy.atom_system_force(self.index);
    }

    /// Adds `force` to the host force buffer for this atom.
    ///
    /// The force is not integrated here; the host uses it on its next step.
    #[inline]
    pub fn apply_force(&self, proxy: &mut dyn AtomProxy, force: DVec3) {
        proxy.apply_atom_force(self.index, force);
    }
}

// End of File
