// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file,
// You can obtain one at <https://mozilla.org/MPL/2.0/>.

//! # Atom groups for collective variables
//!
//! Per-step geometry of named atom groups inside a molecular-dynamics host:
//! reading positions through an [`AtomProxy`], fitting a group onto a
//! reference configuration (optimal rotation plus centering), and sending
//! forces computed in the fitted frame back to the host's atoms, including
//! the derivatives of the fit itself.
//!
//! A typical step for one group:
//!
//! ```
//! use colvar_atoms::prelude::*;
//! use glam::f64::DVec3;
//!
//! let positions = vec![
//!     DVec3::new(0.0, 0.0, 0.0),
//!     DVec3::new(1.0, 0.0, 0.0),
//!     DVec3::new(0.0, 1.0, 0.0),
//! ];
//! let mut proxy = InMemoryProxy::with_positions(positions.clone());
//! let mut group = AtomGroup::from_ids(&proxy, &[0, 1, 2])?
//!     .with_reference(positions, FitSettings { center: true, rotate: true, ..Default::default() })?;
//!
//! group.read_positions(&proxy);
//! let com = group.center_of_mass();
//! group.set_weighted_gradient(DVec3::X);
//! group.apply_colvar_force(&mut proxy, -0.5 * com.x);
//! # Ok::<(), colvar_atoms::AtomGroupError>(())
//! ```

pub mod atom;
pub mod error;
pub mod group;
pub mod logging;
pub mod proxy;
pub mod rotation;

pub use atom::Atom;
pub use error::{AtomGroupError, Result};
pub use group::AtomGroup;
pub use group::config::AtomGroupConfig;
pub use group::fit::FitSettings;
pub use group::registry::{GroupId, GroupRegistry};
pub use proxy::{AtomProxy, InMemoryProxy, ProxyIndex};
pub use rotation::OptimalRotation;

/// A module which is typically glob imported.
pub mod prelude {
    pub use crate::atom::Atom;
    pub use crate::group::AtomGroup;
    pub use crate::group::config::AtomGroupConfig;
    pub use crate::group::fit::FitSettings;
    pub use crate::group::registry::{GroupId, GroupRegistry};
    pub use crate::proxy::{AtomProxy, InMemoryProxy};
}

// End of File
