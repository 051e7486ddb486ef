use approx::assert_abs_diff_eq;
use glam::Vec3;

use xpbdsoft::{
    body::{BodyParams, DeformableBody},
    mesh::TetMeshDescriptor,
    rig::BoneChain,
    skinning::VisualSkin,
    xpbd::{Body, Simulation, SimulationParams},
};

const TWO_TET_ASSET: &str = r#"{
    "vertices": [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0],
    "tetFaceIds": [0, 1, 2, 3, 1, 2, 3, 4],
    "edgeList": [0, 1, 0, 2, 0, 3, 1, 2, 1, 3, 2, 3, 1, 4, 2, 4, 3, 4, 1, 0],
    "triFaceIds": [0, 2, 1, 0, 1, 3, 0, 3, 2, 1, 2, 4, 1, 4, 3, 2, 3, 4]
}"#;

fn no_gravity() -> SimulationParams {
    SimulationParams {
        gravity: Vec3::ZERO,
        ..SimulationParams::default()
    }
}

#[test]
fn test_body_at_rest_does_not_drift() {
    let mut sim = Simulation::new(no_gravity());
    let desc = TetMeshDescriptor::box_grid(Vec3::ZERO, Vec3::new(1.0, 0.5, 2.0), [2, 1, 3]);
    let params = BodyParams {
        edge_compliance: 0.0,
        ..BodyParams::default()
    };
    let id = sim.spawn(&desc, params).unwrap();

    // 20 frames of 5 substeps.
    for _ in 0..20 {
        sim.step();
    }

    let body = sim.body(id).unwrap().deformable();
    for (x, y) in body.positions().iter().zip(&desc.vertices) {
        assert_abs_diff_eq!(*x, *y, epsilon = 1e-5);
    }
    for nr in 0..body.tetrahedra().len() {
        assert_abs_diff_eq!(body.tet_volume(nr), body.tetrahedra()[nr].rest_volume, epsilon = 1e-6);
    }
    assert!(sim.kinetic_energy() < 1e-8);
}

#[test]
fn test_free_particle_lands_and_stays_on_floor() {
    let desc = TetMeshDescriptor {
        vertices: vec![0.3, 1.0, -0.2],
        ..TetMeshDescriptor::default()
    };
    let mut particle = DeformableBody::new(&desc, BodyParams::default()).unwrap();
    particle.set_inverse_mass(0, 1.0);

    let mut sim = Simulation::new(SimulationParams::default());
    let id = sim.add_body(particle);

    let mut landed_at = None;
    for frame in 0..120 {
        sim.step();
        let p = sim.body(id).unwrap().deformable().position(0);
        assert!(p.y >= 0.0);
        if p.y == 0.0 && landed_at.is_none() {
            landed_at = Some(frame);
        }
    }

    // Free fall from 1 m under 10 m/s² takes about 0.45 s.
    let landed_at = landed_at.expect("particle never reached the floor");
    assert!((20..35).contains(&landed_at), "landed at frame {landed_at}");

    let p = sim.body(id).unwrap().deformable().position(0);
    assert_eq!(p, Vec3::new(0.3, 0.0, -0.2));
}

#[test]
fn test_json_asset_masses_and_edges() {
    let desc = TetMeshDescriptor::from_json_str(TWO_TET_ASSET).unwrap();
    let body = DeformableBody::new(&desc, BodyParams::default()).unwrap();

    // The repeated 1-0 edge is dropped.
    assert_eq!(body.edges().len(), 9);
    assert_eq!(body.surface_triangles().len(), 6);

    let v0 = body.tetrahedra()[0].rest_volume;
    let v1 = body.tetrahedra()[1].rest_volume;
    assert_abs_diff_eq!(v0, 1.0 / 6.0, epsilon = 1e-6);
    assert!(v1 > 0.0);

    let w = body.inverse_masses();
    assert_abs_diff_eq!(w[0], 4.0 / v0, epsilon = 1e-3);
    assert_abs_diff_eq!(w[4], 4.0 / v1, epsilon = 1e-3);
    assert_abs_diff_eq!(w[1], 4.0 / v0 + 4.0 / v1, epsilon = 1e-3);
}

#[test]
fn test_grabbed_particle_follows_the_cursor() {
    let mut sim = Simulation::new(SimulationParams::default());
    let desc = TetMeshDescriptor::box_grid(Vec3::new(0.0, 1.0, 0.0), Vec3::ONE, [2, 2, 2]);
    let id = sim.spawn(&desc, BodyParams::default()).unwrap();
    let before = sim.body(id).unwrap().deformable().inverse_masses().to_vec();

    sim.start_grab(id, Vec3::new(1.0, 2.0, 1.0));
    let grabbed = sim.body(id).unwrap().deformable().grabbed().unwrap();

    let mut target = Vec3::new(1.0, 2.0, 1.0);
    for _ in 0..30 {
        target += Vec3::new(0.0, 0.02, 0.0);
        sim.move_grabbed(id, target);
        sim.step();
        assert_eq!(sim.body(id).unwrap().deformable().position(grabbed), target);
    }

    sim.end_grab(id, Vec3::new(0.0, 1.2, 0.0));
    let body = sim.body(id).unwrap().deformable();
    assert_eq!(body.inverse_masses(), before.as_slice());
    assert_eq!(body.velocity(grabbed), Vec3::new(0.0, 1.2, 0.0));
    assert_eq!(body.grabbed(), None);
}

#[test]
fn test_bone_bound_body_sways_without_blowing_up() {
    let mut sim = Simulation::new(SimulationParams::default());
    let desc = TetMeshDescriptor::box_grid(Vec3::new(-0.25, 0.0, -0.25), Vec3::new(0.5, 4.0, 0.5), [1, 8, 1]);
    let id = sim
        .spawn_bone_bound(&desc, BodyParams::default(), BoneChain::new(Vec3::ZERO, 0.5, 8))
        .unwrap();

    // alpha = 2e-5 * 300² = 1.8, so each binding pass removes C / 1.8.
    if let Some(Body::BoneBound(bound)) = sim.body_mut(id) {
        bound.binding_compliance = 2e-5;
    }

    for _ in 0..60 {
        sim.step();
    }

    let body = sim.body(id).unwrap().deformable();
    assert!(body.positions().iter().all(|x| x.is_finite()));
    let (min, max) = body.bounding_box();
    assert!(min.y > -0.5, "sank through the floor, min {min}");
    assert!(max.y < 5.0, "stretched upwards, max {max}");
}

#[test]
fn test_visual_mesh_follows_falling_body() {
    let mut sim = Simulation::new(SimulationParams::default());
    let desc = TetMeshDescriptor::box_grid(Vec3::new(0.0, 2.0, 0.0), Vec3::ONE, [1, 1, 1]);
    let id = sim.spawn(&desc, BodyParams::default()).unwrap();

    let visual = vec![0.5, 2.5, 0.5, 0.2, 2.9, 0.7];
    let skin = VisualSkin::new(sim.body(id).unwrap().deformable(), &visual).unwrap();
    assert_eq!(skin.num_bound(), 2);

    sim.step();
    let mut out = visual.clone();
    let body = sim.body(id).unwrap().deformable();
    skin.update(body, &mut out);

    // Rigid free fall: every point moves down by the same amount as the body.
    let drop = body.position(0).y - 2.0;
    assert!(drop < 0.0);
    for (skinned, rest) in out.chunks_exact(3).zip(visual.chunks_exact(3)) {
        assert_abs_diff_eq!(skinned[0], rest[0], epsilon = 1e-4);
        assert_abs_diff_eq!(skinned[1] - rest[1], drop, epsilon = 1e-4);
        assert_abs_diff_eq!(skinned[2], rest[2], epsilon = 1e-4);
    }
}
