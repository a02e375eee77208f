// Tests for fitting atom groups onto reference positions: centering,
// rotation, fitting against another group, and the fit policy.

use colvar_atoms::prelude::*;
use colvar_atoms::AtomGroupError;
use glam::f64::{DMat3, DQuat, DVec3};
use std::f64::consts::FRAC_PI_2;

// ============================================================================
// Helpers
// ============================================================================

fn assert_approx_eq(actual: f64, expected: f64, tol: f64, msg: &str) {
    let diff = (actual - expected).abs();
    assert!(
        diff < tol,
        "{msg}: expected {expected}, got {actual} (diff={diff}, tol={tol})"
    );
}

fn assert_vec_approx_eq(actual: DVec3, expected: DVec3, tol: f64, msg: &str) {
    let diff = (actual - expected).length();
    assert!(
        diff < tol,
        "{msg}: expected {expected}, got {actual} (diff={diff}, tol={tol})"
    );
}

fn assert_mat_approx_eq(actual: DMat3, expected: DMat3, tol: f64, msg: &str) {
    for (a, e) in actual.to_cols_array().iter().zip(expected.to_cols_array().iter()) {
        assert_approx_eq(*a, *e, tol, msg);
    }
}

fn triangle() -> Vec<DVec3> {
    vec![
        DVec3::new(0.0, 0.0, 0.0),
        DVec3::new(1.0, 0.0, 0.0),
        DVec3::new(0.0, 1.0, 0.0),
    ]
}

fn quarter_turn_z() -> DQuat {
    DQuat::from_rotation_z(FRAC_PI_2)
}

/// The reference turned a quarter turn about z and moved to (5, 5, 5).
fn moved_triangle() -> Vec<DVec3> {
    let shift = DVec3::splat(5.0);
    triangle().iter().map(|&r| quarter_turn_z() * r + shift).collect()
}

fn full_fit() -> FitSettings {
    FitSettings {
        center: true,
        rotate: true,
        ..Default::default()
    }
}

// ============================================================================
// Fitting on the group's own atoms
// ============================================================================

#[test]
fn moved_triangle_is_fitted_back_onto_reference() {
    let proxy = InMemoryProxy::with_positions(moved_triangle());
    let mut group = AtomGroup::from_ids(&proxy, &[0, 1, 2])
        .unwrap()
        .with_reference(triangle(), full_fit())
        .unwrap();

    group.read_positions(&proxy);

    for (i, (&p, &r)) in group.positions().unwrap().iter().zip(triangle().iter()).enumerate() {
        assert_vec_approx_eq(p, r, 1e-10, &format!("fitted position {i}"));
    }
    assert_mat_approx_eq(
        group.rotation_matrix() * DMat3::from_quat(quarter_turn_z()),
        DMat3::IDENTITY,
        1e-10,
        "R undoes the quarter turn",
    );
    assert_vec_approx_eq(
        group.fit_centroid(),
        quarter_turn_z() * DVec3::new(1.0 / 3.0, 1.0 / 3.0, 0.0) + DVec3::splat(5.0),
        1e-12,
        "fitting centroid",
    );
    assert_approx_eq(group.fit_rmsd().unwrap(), 0.0, 1e-9, "rmsd");

    // The host never sees the fitted coordinates.
    assert_eq!(proxy.positions, moved_triangle());
    assert_eq!(group.lab_positions(), moved_triangle().as_slice());
}

#[test]
fn reference_configuration_fits_to_identity() {
    let proxy = InMemoryProxy::with_positions(triangle());
    let mut group = AtomGroup::from_ids(&proxy, &[0, 1, 2])
        .unwrap()
        .with_reference(triangle(), full_fit())
        .unwrap();

    group.read_positions(&proxy);

    assert_mat_approx_eq(group.rotation_matrix(), DMat3::IDENTITY, 1e-12, "identity rotation");
    assert_vec_approx_eq(
        group.fit_centroid(),
        group.reference_centroid().unwrap(),
        1e-12,
        "zero translation",
    );
    for (&p, &r) in group.positions().unwrap().iter().zip(triangle().iter()) {
        assert_vec_approx_eq(p, r, 1e-12, "unchanged position");
    }
}

#[test]
fn reference_is_stored_centered() {
    let proxy = InMemoryProxy::with_positions(triangle());
    let group = AtomGroup::from_ids(&proxy, &[0, 1, 2])
        .unwrap()
        .with_reference(triangle(), full_fit())
        .unwrap();

    let centroid = group.reference_centroid().unwrap();
    assert_vec_approx_eq(centroid, DVec3::new(1.0 / 3.0, 1.0 / 3.0, 0.0), 1e-12, "centroid");
    let sum: DVec3 = group.reference_positions().unwrap().iter().copied().sum();
    assert_vec_approx_eq(sum, DVec3::ZERO, 1e-12, "centered reference");
}

#[test]
fn reference_count_must_match() {
    let proxy = InMemoryProxy::with_positions(triangle());
    let result = AtomGroup::from_ids(&proxy, &[0, 1, 2])
        .unwrap()
        .with_reference(triangle()[..2].to_vec(), full_fit());
    assert!(matches!(
        result,
        Err(AtomGroupError::ReferenceCountMismatch { expected: 3, found: 2 })
    ));
}

#[test]
fn center_only_translates() {
    let shift = DVec3::new(-2.0, 3.0, 0.5);
    let positions: Vec<DVec3> = triangle().iter().map(|&r| r + shift).collect();
    let proxy = InMemoryProxy::with_positions(positions);
    let mut group = AtomGroup::from_ids(&proxy, &[0, 1, 2])
        .unwrap()
        .with_reference(
            triangle(),
            FitSettings {
                center: true,
                ..Default::default()
            },
        )
        .unwrap();

    group.read_positions(&proxy);

    assert_mat_approx_eq(group.rotation_matrix(), DMat3::IDENTITY, 1e-15, "no rotation");
    for (&p, &r) in group.positions().unwrap().iter().zip(triangle().iter()) {
        assert_vec_approx_eq(p, r, 1e-12, "translated position");
    }
}

#[test]
fn rotate_only_keeps_the_origin() {
    let proxy = InMemoryProxy::with_positions(triangle());
    let group = AtomGroup::from_ids(&proxy, &[0, 1, 2])
        .unwrap()
        .with_reference(triangle(), full_fit())
        .unwrap();
    let centered_reference = group.reference_positions().unwrap().to_vec();

    // Current points: the centered reference, turned a quarter turn about z.
    let current: Vec<DVec3> = centered_reference.iter().map(|&r| quarter_turn_z() * r).collect();
    let proxy = InMemoryProxy::with_positions(current);
    let mut group = AtomGroup::from_ids(&proxy, &[0, 1, 2])
        .unwrap()
        .with_reference(
            triangle(),
            FitSettings {
                rotate: true,
                ..Default::default()
            },
        )
        .unwrap();

    group.read_positions(&proxy);

    assert_eq!(group.fit_centroid(), DVec3::ZERO);
    for (&p, &r) in group.positions().unwrap().iter().zip(centered_reference.iter()) {
        assert_vec_approx_eq(p, r, 1e-10, "rotated position");
    }
}

#[test]
fn velocities_and_system_forces_follow_the_rotation() {
    let mut proxy = InMemoryProxy::with_positions(moved_triangle());
    proxy.velocities[1] = DVec3::new(0.0, 1.0, 0.0);
    proxy.system_forces[2] = DVec3::new(0.0, 0.0, 2.0);
    let mut group = AtomGroup::from_ids(&proxy, &[0, 1, 2])
        .unwrap()
        .with_reference(triangle(), full_fit())
        .unwrap();

    group.read_positions(&proxy);
    group.read_velocities(&proxy);
    group.read_system_forces(&proxy);

    assert_vec_approx_eq(group[1].vel, DVec3::new(1.0, 0.0, 0.0), 1e-10, "rotated velocity");
    assert_vec_approx_eq(group[2].system_force, DVec3::new(0.0, 0.0, 2.0), 1e-10, "axial force");
}

#[test]
fn fit_rmsd_measures_the_residual() {
    let mut positions = moved_triangle();
    positions[2] += DVec3::new(0.1, -0.05, 0.2);
    let proxy = InMemoryProxy::with_positions(positions);
    let mut group = AtomGroup::from_ids(&proxy, &[0, 1, 2])
        .unwrap()
        .with_reference(triangle(), full_fit())
        .unwrap();

    assert!(group.fit_rmsd().is_none(), "no fit before the first read");
    group.read_positions(&proxy);

    let fitted = group.positions().unwrap();
    let msd = fitted
        .iter()
        .zip(triangle().iter())
        .map(|(&p, &r)| (p - r).length_squared())
        .sum::<f64>()
        / 3.0;
    let rmsd = group.fit_rmsd().unwrap();
    assert!(rmsd > 0.0);
    assert_approx_eq(rmsd, msd.sqrt(), 1e-12, "rmsd of the fitted positions");
}

#[test]
fn fit_weights_follow_explicit_weights() {
    let proxy = InMemoryProxy::with_positions(triangle());
    let group = AtomGroup::from_ids(&proxy, &[0, 1, 2])
        .unwrap()
        .with_reference(triangle(), full_fit())
        .unwrap()
        .with_weights(vec![2.0, 1.0, 1.0])
        .unwrap();
    assert_vec_approx_eq(
        group.reference_centroid().unwrap(),
        DVec3::new(0.25, 0.25, 0.0),
        1e-12,
        "weighted reference centroid",
    );
}

#[test]
fn update_masses_recenters_the_reference() {
    let mut proxy = InMemoryProxy::with_positions(triangle());
    let mut group = AtomGroup::from_ids(&proxy, &[0, 1, 2])
        .unwrap()
        .with_reference(triangle(), full_fit())
        .unwrap();

    proxy.masses = vec![1.0, 2.0, 1.0];
    group.update_masses(&proxy).unwrap();

    let centroid = group.reference_centroid().unwrap();
    assert_vec_approx_eq(centroid, DVec3::new(0.5, 0.25, 0.0), 1e-12, "new centroid");
    for (&r, &expected) in group.reference_positions().unwrap().iter().zip(triangle().iter()) {
        assert_vec_approx_eq(r + centroid, expected, 1e-12, "absolute reference kept");
    }
}

// ============================================================================
// Fitting against another group
// ============================================================================

#[test]
fn external_fitting_group_defines_the_frame() {
    let site = DVec3::new(0.5, 0.5, 2.0);
    let mut positions = moved_triangle();
    positions.push(quarter_turn_z() * site + DVec3::splat(5.0));
    let proxy = InMemoryProxy::new(vec![12.0, 1.0, 1.0, 16.0], positions);

    let mut registry = GroupRegistry::new();
    let fitting = AtomGroup::from_ids(&proxy, &[0, 1, 2]).unwrap();
    let fitting_id = registry.insert("frame", fitting).unwrap();

    let site_group = AtomGroup::from_ids(&proxy, &[3])
        .unwrap()
        .with_fitting_group(fitting_id, registry.get(fitting_id).unwrap(), triangle(), full_fit())
        .unwrap();
    let site_id = registry.insert("site", site_group).unwrap();

    registry.read_positions(&proxy);
    let group = registry.get(site_id).unwrap();

    assert_eq!(group.fitting_group(), Some(fitting_id));
    assert_eq!(group.fitting_atoms().len(), 3);
    assert_vec_approx_eq(group[0].pos, site, 1e-10, "site in the reference frame");

    // The fitting group itself is not fitted.
    let frame = registry.get(fitting_id).unwrap();
    assert_eq!(frame.positions().unwrap(), moved_triangle());
}

#[test]
fn external_reference_count_follows_the_fitting_group() {
    let proxy = InMemoryProxy::with_positions(moved_triangle());
    let fitting = AtomGroup::from_ids(&proxy, &[0, 1, 2]).unwrap();
    let result = AtomGroup::from_ids(&proxy, &[0])
        .unwrap()
        .with_fitting_group(0, &fitting, vec![DVec3::ZERO], full_fit());
    assert!(matches!(
        result,
        Err(AtomGroupError::ReferenceCountMismatch { expected: 3, found: 1 })
    ));
}

#[test]
fn rejected_fitting_masses_leave_the_frame_unchanged() {
    let mut positions = moved_triangle();
    positions.push(DVec3::new(4.0, 6.0, 5.5));
    let mut proxy = InMemoryProxy::new(vec![12.0, 1.0, 1.0, 16.0], positions);
    let fitting = AtomGroup::from_ids(&proxy, &[0, 1, 2]).unwrap();
    let mut group = AtomGroup::from_ids(&proxy, &[3])
        .unwrap()
        .with_fitting_group(0, &fitting, triangle(), full_fit())
        .unwrap();
    let centroid = group.reference_centroid().unwrap();

    proxy.masses = vec![0.0, 0.0, 0.0, 20.0];
    assert!(matches!(
        group.update_masses(&proxy),
        Err(AtomGroupError::NonPositiveTotalMass { .. })
    ));
    assert_eq!(group.total_mass(), 16.0);
    assert_eq!(group.reference_centroid(), Some(centroid));
    assert!(group.fitting_atoms().iter().all(|a| a.mass > 0.0));

    group.read_positions(&proxy);
    assert!(group[0].pos.is_finite());
}

// ============================================================================
// Fit policy
// ============================================================================

#[test]
fn default_fit_needs_reference_positions() {
    let proxy = InMemoryProxy::with_positions(triangle());
    let mut group = AtomGroup::from_ids(&proxy, &[0, 1, 2]).unwrap();
    assert!(matches!(
        group.set_default_fit(true, true),
        Err(AtomGroupError::MissingReferencePositions)
    ));
    group.set_default_fit(false, false).unwrap();
    assert!(!group.fit_settings().is_fitting());
}

#[test]
fn default_fit_applies_unless_user_defined() {
    let proxy = InMemoryProxy::with_positions(moved_triangle());

    let mut automatic = AtomGroup::from_ids(&proxy, &[0, 1, 2])
        .unwrap()
        .with_reference(triangle(), FitSettings::default())
        .unwrap();
    automatic.set_default_fit(true, true).unwrap();
    assert!(automatic.fit_settings().center);
    assert!(automatic.fit_settings().rotate);

    let mut explicit = AtomGroup::from_ids(&proxy, &[0, 1, 2])
        .unwrap()
        .with_reference(
            triangle(),
            FitSettings {
                user_defined: true,
                ..Default::default()
            },
        )
        .unwrap();
    explicit.set_default_fit(true, true).unwrap();
    assert!(!explicit.fit_settings().is_fitting());

    explicit.read_positions(&proxy);
    assert_eq!(explicit.positions().unwrap(), moved_triangle());
}
