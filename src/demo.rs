//! Interactive raylib window: mouse grabbing, spawning and live tuning.

use glam::Vec3;
use raylib::prelude::*;
use tracing::{debug, error, info, instrument};

use xpbdsoft::{
    body::BodyParams,
    grabber::{Grabber, Ray as PickRay},
    mesh::TetMeshDescriptor,
    rig::{BoneChain, Skeleton},
    xpbd::{Body, Simulation, SimulationParams},
};

const TARGET_FPS: u16 = 60;
const CHAIN_BONES: usize = 8;

struct View {
    show_wireframe: bool,
    show_faces: bool,
    show_bones: bool,
}

fn rv(v: Vec3) -> Vector3 {
    Vector3::new(v.x, v.y, v.z)
}

#[instrument(skip(desc))]
fn setup_camera(desc: &TetMeshDescriptor) -> (Vec3, Vec3) {
    let (min, max) = desc.bounding_box();
    let center = (min + max) * 0.5;
    let size = (max - min).length().max(1.0);
    let distance = size * 2.5;
    let camera_pos = center + Vec3::splat(distance * 0.7);
    debug!(%center, %camera_pos, size, "Camera setup");
    (camera_pos, center)
}

fn spawn_offset(sim: &Simulation) -> Vec3 {
    let slot = sim.num_bodies() % 5;
    Vec3::new(slot as f32 * 1.5 - 3.0, 1.0, 0.0)
}

fn spawn_free(sim: &mut Simulation, desc: &TetMeshDescriptor, params: BodyParams) {
    let mut desc = desc.clone();
    desc.translate(spawn_offset(sim));
    if let Err(e) = sim.spawn(&desc, params) {
        error!(error = %e, "Spawn failed");
    }
}

fn spawn_bound(sim: &mut Simulation, desc: &TetMeshDescriptor, params: BodyParams) {
    let mut desc = desc.clone();
    desc.translate(spawn_offset(sim));
    let (min, max) = desc.bounding_box();
    let root = Vec3::new((min.x + max.x) * 0.5, min.y, (min.z + max.z) * 0.5);
    let chain = BoneChain::new(root, (max.y - min.y) / CHAIN_BONES as f32, CHAIN_BONES);
    if let Err(e) = sim.spawn_bone_bound(&desc, params, chain) {
        error!(error = %e, "Spawn failed");
    }
}

fn handle_input(
    rl: &RaylibHandle,
    view: &mut View,
    sim: &mut Simulation,
    body_params: &mut BodyParams,
    desc: &TetMeshDescriptor,
) {
    if rl.is_key_pressed(KeyboardKey::KEY_R) {
        view.show_wireframe = !view.show_wireframe;
    }
    if rl.is_key_pressed(KeyboardKey::KEY_F) {
        view.show_faces = !view.show_faces;
    }
    if rl.is_key_pressed(KeyboardKey::KEY_B) {
        view.show_bones = !view.show_bones;
    }
    if rl.is_key_pressed(KeyboardKey::KEY_SPACE) {
        sim.params.paused = !sim.params.paused;
    }
    if rl.is_key_pressed(KeyboardKey::KEY_S) {
        for body in sim.bodies_mut() {
            body.deformable_mut().squash();
        }
    }
    if rl.is_key_pressed(KeyboardKey::KEY_N) {
        spawn_free(sim, desc, *body_params);
    }
    if rl.is_key_pressed(KeyboardKey::KEY_C) {
        spawn_bound(sim, desc, *body_params);
    }

    let before = *body_params;

    // Edge compliance: 1/2 to double/halve
    if rl.is_key_pressed(KeyboardKey::KEY_ONE) {
        body_params.edge_compliance = (body_params.edge_compliance * 2.0).min(1000.0);
    }
    if rl.is_key_pressed(KeyboardKey::KEY_TWO) {
        body_params.edge_compliance *= 0.5;
    }

    // Volume compliance: 3/4 to increase/decrease
    if rl.is_key_pressed(KeyboardKey::KEY_THREE) {
        body_params.volume_compliance += 0.001;
    }
    if rl.is_key_pressed(KeyboardKey::KEY_FOUR) {
        body_params.volume_compliance = (body_params.volume_compliance - 0.001).max(0.0);
    }

    // Damping: 5/6 to increase/decrease
    if rl.is_key_pressed(KeyboardKey::KEY_FIVE) {
        body_params.damping = (body_params.damping + 0.01).min(1.0);
    }
    if rl.is_key_pressed(KeyboardKey::KEY_SIX) {
        body_params.damping = (body_params.damping - 0.01).max(0.0);
    }

    if *body_params != before {
        for body in sim.bodies_mut() {
            body.deformable_mut().params = *body_params;
        }
    }

    // Gravity: 9/0 to increase/decrease magnitude
    if rl.is_key_pressed(KeyboardKey::KEY_NINE) {
        sim.params.gravity.y -= 0.5;
    }
    if rl.is_key_pressed(KeyboardKey::KEY_ZERO) {
        sim.params.gravity.y += 0.5;
    }

    if rl.is_key_pressed(KeyboardKey::KEY_UP) {
        sim.params.num_substeps = (sim.params.num_substeps + 1).min(100);
    }
    if rl.is_key_pressed(KeyboardKey::KEY_DOWN) {
        sim.params.num_substeps = sim.params.num_substeps.saturating_sub(1).max(1);
    }
}

fn handle_mouse(rl: &RaylibHandle, camera: Camera3D, sim: &mut Simulation, grabber: &mut Grabber) {
    let ray = rl.get_mouse_ray(rl.get_mouse_position(), camera);
    let ray = PickRay::new(
        Vec3::new(ray.position.x, ray.position.y, ray.position.z),
        Vec3::new(ray.direction.x, ray.direction.y, ray.direction.z),
    );

    if rl.is_mouse_button_pressed(MouseButton::MOUSE_BUTTON_LEFT) {
        grabber.start(sim, &ray);
    } else if rl.is_mouse_button_released(MouseButton::MOUSE_BUTTON_LEFT) {
        grabber.end(sim);
    } else if rl.is_mouse_button_down(MouseButton::MOUSE_BUTTON_LEFT) {
        grabber.drag(sim, &ray);
    }
}

fn draw_body(d3: &mut RaylibMode3D<RaylibDrawHandle>, body: &Body, view: &View) {
    let deformable = body.deformable();
    if view.show_faces {
        let color = Color::ORANGE.alpha(0.9);
        for &[a, b, c] in deformable.surface_triangles() {
            let (a, b, c) = (
                rv(deformable.position(a)),
                rv(deformable.position(b)),
                rv(deformable.position(c)),
            );
            d3.draw_triangle3D(a, b, c, color);
            d3.draw_triangle3D(a, c, b, color);
        }
    }
    if view.show_wireframe {
        for edge in deformable.edges() {
            d3.draw_line_3D(
                rv(deformable.position(edge.ids[0])),
                rv(deformable.position(edge.ids[1])),
                Color::BLUE,
            );
        }
    }
    if let (true, Body::BoneBound(bound)) = (view.show_bones, body) {
        let chain = bound.chain();
        for i in 0..chain.num_segments() {
            let segment = chain.segment(i);
            d3.draw_line_3D(rv(segment.start), rv(segment.end), Color::RED);
        }
    }
}

fn draw_ui(d: &mut RaylibDrawHandle, sim: &Simulation, body_params: &BodyParams) {
    let screen_width = d.get_screen_width();

    // Left panel: Controls help
    d.draw_fps(10, 10);
    d.draw_text("=== CONTROLS ===", 10, 40, 16, Color::DARKGRAY);
    d.draw_text("Mouse: Grab and throw", 10, 60, 14, Color::MIDNIGHTBLUE);
    d.draw_text("R/F/B: Wireframe/Faces/Bones", 10, 78, 14, Color::MIDNIGHTBLUE);
    d.draw_text("SPACE: Pause/Resume", 10, 96, 14, Color::MIDNIGHTBLUE);
    d.draw_text("S: Squash", 10, 114, 14, Color::MIDNIGHTBLUE);
    d.draw_text("N/C: Spawn body/bound body", 10, 132, 14, Color::MIDNIGHTBLUE);

    d.draw_text("=== ADJUST ===", 10, 158, 16, Color::DARKGRAY);
    d.draw_text("1/2: Edge Compliance x2 / /2", 10, 178, 14, Color::MIDNIGHTBLUE);
    d.draw_text("3/4: Volume Compliance +/-", 10, 196, 14, Color::MIDNIGHTBLUE);
    d.draw_text("5/6: Damping +/-", 10, 214, 14, Color::MIDNIGHTBLUE);
    d.draw_text("9/0: Gravity +/-", 10, 232, 14, Color::MIDNIGHTBLUE);
    d.draw_text("UP/DOWN: Substeps", 10, 250, 14, Color::MIDNIGHTBLUE);

    // Right panel: Current parameter values
    let panel_x = screen_width - 220;
    d.draw_rectangle(panel_x - 10, 30, 220, 200, Color::WHITE.alpha(0.85));
    d.draw_rectangle_lines(panel_x - 10, 30, 220, 200, Color::DARKGRAY);

    d.draw_text("=== PARAMETERS ===", panel_x, 40, 16, Color::DARKGRAY);

    let params = &sim.params;
    let status_text = if params.paused { "PAUSED" } else { "RUNNING" };
    let status_color = if params.paused { Color::RED } else { Color::GREEN };
    d.draw_text(status_text, panel_x, 60, 18, status_color);

    let lines = [
        format!("Edge Compl:   {:.3}", body_params.edge_compliance),
        format!("Vol Compl:    {:.4}", body_params.volume_compliance),
        format!("Damping:      {:.2}", body_params.damping),
        format!("Gravity:      {:.2}", params.gravity.y),
        format!("Substeps:     {}", params.substeps()),
        format!("Bodies:       {}", sim.num_bodies()),
        format!("Energy:       {:.3}", sim.kinetic_energy()),
    ];
    for (row, line) in (0..).zip(&lines) {
        d.draw_text(line, panel_x, 85 + 18 * row, 14, Color::DARKBLUE);
    }
}

/// Open the window and run until it is closed.
#[instrument(skip(desc))]
pub fn run(params: SimulationParams, desc: TetMeshDescriptor) {
    let mut sim = Simulation::new(params);
    let mut body_params = BodyParams::default();
    if let Err(e) = sim.spawn(&desc, body_params) {
        error!(error = %e, "Initial mesh rejected");
    }
    info!(bodies = sim.num_bodies(), "Demo scene ready");

    let mut view = View {
        show_wireframe: false,
        show_faces: true,
        show_bones: true,
    };
    let mut grabber = Grabber::new();

    let (mut rl, thread) = raylib::init()
        .size(1000, 1000)
        .title("XPBD Soft Body Simulation")
        .build();

    let (camera_pos, target) = setup_camera(&desc);
    let mut camera = Camera3D::perspective(rv(camera_pos), rv(target), Vector3::new(0.0, 1.0, 0.0), 60.0);
    rl.set_target_fps(TARGET_FPS.into());

    while !rl.window_should_close() {
        handle_input(&rl, &mut view, &mut sim, &mut body_params, &desc);
        handle_mouse(&rl, camera, &mut sim, &mut grabber);
        if grabber.held().is_none() {
            rl.update_camera(&mut camera, CameraMode::CAMERA_THIRD_PERSON);
        }

        sim.step();
        grabber.advance(sim.params.dt);

        let mut d = rl.begin_drawing(&thread);
        d.clear_background(Color::RAYWHITE);

        {
            let mut d3 = d.begin_mode3D(camera);

            d3.draw_plane(Vector3::new(0.0, 0.0, 0.0), Vector2::new(10.0, 10.0), Color::GRAY);
            d3.draw_grid(20, 2.0);

            for body in sim.bodies() {
                draw_body(&mut d3, body, &view);
            }
        }

        draw_ui(&mut d, &sim, &body_params);
    }
}
