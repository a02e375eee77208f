// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file,
// You can obtain one at <https://mozilla.org/MPL/2.0/>.

// Boundary with the host simulation engine.
//
// Atom groups never hold on to the host: every call that reads or writes
// per-atom data receives the proxy explicitly, so a test can bind a group to
// an in-memory mock and a production host can bind it to its own buffers.

use glam::f64::DVec3;

/// Index of an atom in the proxy's arrays (not the topology id).
pub type ProxyIndex = usize;

/// Data-access interface onto the host's atom tables.
///
/// Implementations may panic on an invalid index: index validity is
/// established once, when the atom handle is created through
/// [`AtomProxy::atom_index`].
pub trait AtomProxy {
    /// Resolves a 0-based topology id to a proxy index.
    fn atom_index(&self, atom_id: usize) -> Option<ProxyIndex>;

    fn atom_mass(&self, index: ProxyIndex) -> f64;

    fn atom_position(&self, index: ProxyIndex) -> DVec3;

    fn atom_velocity(&self, index: ProxyIndex) -> DVec3;

    /// System force acting on the atom at the previous step.
    fn atom_system_force(&self, index: ProxyIndex) -> DVec3;

    /// Adds `force` to the host force buffer. Calls are cumulative within a step.
    fn apply_atom_force(&mut self, index: ProxyIndex, force: DVec3);
}

/// Vec-backed [`AtomProxy`], where topology id and proxy index coincide.
///
/// Forces applied through the proxy are summed into `applied_forces` until
/// [`InMemoryProxy::clear_applied_forces`] is called.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProxy {
    pub masses: Vec<f64>,
    pub positions: Vec<DVec3>,
    pub velocities: Vec<DVec3>,
    pub system_forces: Vec<DVec3>,
    pub applied_forces: Vec<DVec3>,
}

impl InMemoryProxy {
    pub fn new(masses: Vec<f64>, positions: Vec<DVec3>) -> Self {
        debug_assert_eq!(masses.len(), positions.len());
        let n = positions.len();
        Self {
            masses,
            positions,
            velocities: vec![DVec3::ZERO; n],
            system_forces: vec![DVec3::ZERO; n],
            applied_forces: vec![DVec3::ZERO; n],
        }
    }

    /// Creates a proxy with unit masses.
    pub fn with_positions(positions: Vec<DVec3>) -> Self {
        Self::new(vec![1.0; positions.len()], positions)
    }

    pub fn num_atoms(&self) -> usize {
        self.positions.len()
    }

    pub fn clear_applied_forces(&mut self) {
        self.applied_forces.iter_mut().for_each(|f| *f = DVec3::ZERO);
    }

    /// Sum of all forces applied since the last clear.
    pub fn total_applied_force(&self) -> DVec3 {
        self.applied_forces.iter().copied().sum()
    }

    /// Torque of the applied forces about `origin`, using the stored positions.
    pub fn total_applied_torque(&self, origin: DVec3) -> DVec3 {
        self.positions
            .iter()
            .zip(self.applied_forces.iter())
            .map(|(&p, &f)| (p - origin).cross(f))
            .sum()
    }
}

impl AtomProxy for InMemoryProxy {
    fn atom_index(&self, atom_id: usize) -> Option<ProxyIndex> {
        (atom_id < self.positions.len()).then_some(atom_id)
    }

    fn atom_mass(&self, index: ProxyIndex) -> f64 {
        self.masses[index]
    }

    fn atom_position(&self, index: ProxyIndex) -> DVec3 {
        self.positions[index]
    }

    fn atom_velocity(&self, index: ProxyIndex) -> DVec3 {
        self.velocities[index]
    }

    fn atom_system_force(&self, index: ProxyIndex) -> DVec3 {
        self.system_forces[index]
    }

    fn apply_atom_force(&mut self, index: ProxyIndex, force: DVec3) {
        self.applied_forces[index] += force;
    }
}

// End of File
