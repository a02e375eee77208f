// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file,
// You can obtain one at <https://mozilla.org/MPL/2.0/>.

use super::AtomGroup;
use super::config::AtomGroupConfig;
use crate::error::{AtomGroupError, Result};
use crate::proxy::AtomProxy;
use rustc_hash::FxHashMap;

/// Identifier of a group within a [`GroupRegistry`].
pub type GroupId = usize;

/// Owns the named atom groups of a simulation.
///
/// A group that fits against another group refers to it by [`GroupId`]
/// only; it keeps its own handles onto the fitting atoms, so no group ever
/// owns or borrows another one.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: Vec<AtomGroup>,
    names: Vec<String>,
    ids: FxHashMap<String, GroupId>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an already built group under `name`.
    pub fn insert(&mut self, name: &str, group: AtomGroup) -> Result<GroupId> {
        if self.ids.contains_key(name) {
            return Err(AtomGroupError::DuplicateGroupName {
                name: name.to_string(),
            });
        }
        let id = self.groups.len();
        self.groups.push(group);
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        Ok(id)
    }

    /// Builds a group from its configuration and registers it under `name`.
    ///
    /// A fitting group named in the configuration must already be registered.
    pub fn add_group(
        &mut self,
        name: &str,
        config: &AtomGroupConfig,
        proxy: &dyn AtomProxy,
    ) -> Result<GroupId> {
        if self.ids.contains_key(name) {
            return Err(AtomGroupError::DuplicateGroupName {
                name: name.to_string(),
            });
        }
        let fitting = match &config.fitting_group {
            Some(fitting_name) if fitting_name != name => {
                let id = self.id(fitting_name).ok_or_else(|| {
                    AtomGroupError::UnknownFittingGroup {
                        name: fitting_name.clone(),
                    }
                })?;
                Some((id, &self.groups[id]))
            }
            _ => None,
        };
        let group = config.build(proxy, fitting)?;
        self.insert(name, group)
    }

    pub fn id(&self, name: &str) -> Option<GroupId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: GroupId) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn get(&self, id: GroupId) -> Option<&AtomGroup> {
        self.groups.get(id)
    }

    pub fn get_mut(&mut self, id: GroupId) -> Option<&mut AtomGroup> {
        self.groups.get_mut(id)
    }

    pub fn by_name(&self, name: &str) -> Option<&AtomGroup> {
        self.id(name).and_then(|id| self.get(id))
    }

    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut AtomGroup> {
        self.id(name).and_then(move |id| self.groups.get_mut(id))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (GroupId, &str, &AtomGroup)> {
        self.groups
            .iter()
            .zip(self.names.iter())
            .enumerate()
            .map(|(id, (group, name))| (id, name.as_str(), group))
    }

    /// Reads the positions of every group, fitting them where enabled.
    pub fn read_positions(&mut self, proxy: &dyn AtomProxy) {
        for group in self.groups.iter_mut() {
            group.read_positions(proxy);
        }
    }

    /// Resets the data of a group and, when it fits against another group,
    /// of that group as well.
    pub fn reset_atoms_data(&mut self, id: GroupId) {
        let Some(group) = self.groups.get_mut(id) else {
            return;
        };
        group.reset_atoms_data();
        if let Some(fitting_id) = group.fitting_group().filter(|&f| f != id) {
            if let Some(fitting) = self.groups.get_mut(fitting_id) {
                fitting.reset_atoms_data();
            }
        }
    }
}

// End of File
