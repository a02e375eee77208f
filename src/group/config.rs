// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file,
// You can obtain one at <https://mozilla.org/MPL/2.0/>.

use super::AtomGroup;
use super::fit::FitSettings;
use super::registry::GroupId;
use crate::error::{AtomGroupError, Result};
use crate::proxy::AtomProxy;
use glam::f64::DVec3;
use serde::Deserialize;

fn default_true() -> bool {
    true
}

/// Validated options of one atom group, as produced by the selection layer.
///
/// Can be read from TOML:
///
/// ```toml
/// atoms = [0, 1, 2, 3]
/// center_reference = true
/// rotate_reference = true
/// reference_positions = [[0.0, 0.0, 0.0], [1.5, 0.0, 0.0], [0.0, 1.5, 0.0], [0.0, 0.0, 1.5]]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AtomGroupConfig {
    /// 0-based topology ids, in group order; duplicates are allowed.
    #[serde(default)]
    pub atoms: Vec<usize>,
    /// Makes the group a dummy standing in for this fixed point.
    #[serde(default)]
    pub dummy_position: Option<[f64; 3]>,
    #[serde(default)]
    pub center_reference: Option<bool>,
    #[serde(default)]
    pub rotate_reference: Option<bool>,
    #[serde(default = "default_true")]
    pub enable_fit_gradients: bool,
    /// Reference positions in absolute coordinates, one per fitting atom.
    #[serde(default)]
    pub reference_positions: Vec<[f64; 3]>,
    /// Explicit per-atom weights; masses are used when absent.
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
    /// Name of the group whose atoms define the fit (default: this group).
    #[serde(default)]
    pub fitting_group: Option<String>,
    #[serde(default)]
    pub disable_forces: bool,
}

impl AtomGroupConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn fit_settings(&self) -> FitSettings {
        FitSettings {
            center: self.center_reference.unwrap_or(false),
            rotate: self.rotate_reference.unwrap_or(false),
            fit_gradients: self.enable_fit_gradients,
            user_defined: self.center_reference.is_some() || self.rotate_reference.is_some(),
        }
    }

    /// Builds the group, resolving atom ids through `proxy`.
    ///
    /// `fitting` is the already built group named by `fitting_group`, with its
    /// id. Naming another group without reference positions is an error.
    pub fn build(
        &self,
        proxy: &dyn AtomProxy,
        fitting: Option<(GroupId, &AtomGroup)>,
    ) -> Result<AtomGroup> {
        if let Some([x, y, z]) = self.dummy_position {
            if !self.atoms.is_empty() {
                log::warn!(
                    "Dummy atom group ignores its {} listed atoms",
                    self.atoms.len()
                );
            }
            return Ok(AtomGroup::dummy(DVec3::new(x, y, z)).with_no_force(self.disable_forces));
        }
        if self.atoms.is_empty() {
            return Err(AtomGroupError::EmptyGroup);
        }

        let mut group = AtomGroup::from_ids(proxy, &self.atoms)?;
        if let Some(weights) = &self.weights {
            group = group.with_weights(weights.clone())?;
        }

        let settings = self.fit_settings();
        let external_fit = fitting.is_some();
        if (settings.is_fitting() || external_fit) && self.reference_positions.is_empty() {
            return Err(AtomGroupError::MissingReferencePositions);
        }
        if !self.reference_positions.is_empty() {
            let reference: Vec<DVec3> = self
                .reference_positions
                .iter()
                .map(|&p| DVec3::from_array(p))
                .collect();
            group = match fitting {
                Some((id, fitting_group)) => {
                    group.with_fitting_group(id, fitting_group, reference, settings)?
                }
                None => group.with_reference(reference, settings)?,
            };
        }

        log::debug!(
            "Built atom group of {} atoms (center: {}, rotate: {}, fitting group: {:?})",
            group.len(),
            settings.center,
            settings.rotate,
            self.fitting_group
        );
        Ok(group.with_no_force(self.disable_forces))
    }
}

// End of File
