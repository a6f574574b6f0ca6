//! Fixture chains.

use nalgebra::{UnitQuaternion, Vector3};

use kinema_core::math::Pose;
use kinema_ik::chain::Chain;
use kinema_ik::constraint::Hinge;
use kinema_ik::joint::JointId;

/// A root at the origin followed by `links` unit links along x. Every joint
/// but the tip is turned `bend` radians about z, so the arm starts curled in
/// the xy plane away from the straight (singular) pose.
///
/// Returns the chain, with the tip designated as its effector, and the tip.
pub fn planar_arm(links: usize, bend: f32) -> (Chain, JointId) {
    let turn = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), bend);
    let mut chain = Chain::default();
    let mut last = chain.push_root("base", Vector3::zeros(), turn);
    for i in 1..=links {
        let rotation = if i == links {
            UnitQuaternion::identity()
        } else {
            turn
        };
        last = chain
            .push_child(last, format!("link{i}"), Vector3::x(), rotation)
            .expect("parent was just pushed");
    }
    chain
        .set_effectors(vec![last])
        .expect("tip is in the chain");
    (chain, last)
}

/// [`planar_arm`] with a z-axis hinge bounded to `[-limit, limit]` on every
/// joint except the tip.
pub fn hinged_arm(links: usize, bend: f32, limit: f32) -> (Chain, JointId) {
    let (mut chain, tip) = planar_arm(links, bend);
    let ids: Vec<_> = chain.ids().filter(|&id| id != tip).collect();
    for id in ids {
        let hinge = Hinge::new(Vector3::z(), -limit, limit).expect("valid hinge bounds");
        chain.set_constraint(id, hinge).expect("joint is in the chain");
    }
    (chain, tip)
}

/// A trunk of two unit links that splits into a left and a right branch of
/// two unit links each; both branch tips are effectors.
///
/// ```text
/// root ── trunk ── fork ─┬─ l1 ── left
///                        └─ r1 ── right
/// ```
pub fn branched_tree() -> (Chain, [JointId; 2]) {
    let id = UnitQuaternion::identity();
    let left_turn = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.5);
    let right_turn = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -0.5);
    let mut chain = Chain::default();
    let root = chain.push_root("root", Vector3::zeros(), id);
    let trunk = chain.push_child(root, "trunk", Vector3::x(), id).expect("root");
    let fork = chain.push_child(trunk, "fork", Vector3::x(), id).expect("trunk");
    let l1 = chain.push_child(fork, "l1", Vector3::zeros(), left_turn).expect("fork");
    let l2 = chain.push_child(l1, "l2", Vector3::x(), left_turn).expect("l1");
    let left = chain.push_child(l2, "left", Vector3::x(), id).expect("l2");
    let r1 = chain.push_child(fork, "r1", Vector3::zeros(), right_turn).expect("fork");
    let r2 = chain.push_child(r1, "r2", Vector3::x(), right_turn).expect("r1");
    let right = chain.push_child(r2, "right", Vector3::x(), id).expect("r2");
    chain
        .set_effectors(vec![left, right])
        .expect("tips are in the chain");
    (chain, [left, right])
}

/// Position-only goal.
pub fn goal(x: f32, y: f32, z: f32) -> Pose {
    Pose::from_position(Vector3::new(x, y, z))
}
