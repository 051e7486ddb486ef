use clap::{Parser, Subcommand};
use glam::Vec3;
use tracing::{error, info, instrument};

use xpbdsoft::{
    body::BodyParams,
    mesh::TetMeshDescriptor,
    rig::BoneChain,
    xpbd::{Simulation, SimulationParams},
};

#[cfg(feature = "demo")]
mod demo;

#[derive(Parser)]
#[command(name = "xpbdsoft")]
#[command(about = "Extended Position Based Dynamics soft body simulation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a JSON tet mesh to the binary format
    Export {
        /// Input JSON mesh
        #[arg(short, long)]
        input: String,
        /// Output binary file path
        #[arg(short, long)]
        output: String,
    },
    /// Step a scene headless and log its energy and bounds.
    Run {
        /// Optional mesh file (.json or .bin); a box grid is used otherwise
        mesh: Option<String>,
        /// Number of frames to simulate
        #[arg(short, long, default_value_t = 300)]
        frames: usize,
        /// JSON file with simulation settings
        #[arg(short, long)]
        config: Option<String>,
        /// Override the number of substeps per frame
        #[arg(long)]
        substeps: Option<usize>,
        /// Bind the body to an animated chain with this many bones
        #[arg(long)]
        bones: Option<usize>,
    },
    /// Run the interactive simulation window.
    Demo {
        /// Optional mesh file (.json or .bin) to spawn
        mesh: Option<String>,
        /// JSON file with simulation settings
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[instrument]
fn export_mesh(input: &str, output_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!(input, "Loading tetrahedral mesh");

    let mesh = TetMeshDescriptor::from_json(input)?;
    mesh.validate()?;

    info!(
        vertices = mesh.num_particles(),
        edges = mesh.edge_ids.len() / 2,
        faces = mesh.tri_ids.len() / 3,
        tetrahedra = mesh.num_tets(),
        "Mesh loaded successfully"
    );

    mesh.export_to_bincode(output_path)?;

    Ok(())
}

fn load_params(config: Option<&str>) -> Result<SimulationParams, Box<dyn std::error::Error>> {
    Ok(match config {
        Some(path) => SimulationParams::from_json_file(path)?,
        None => SimulationParams::default(),
    })
}

/// Mesh from disk lifted above the floor, or a default box grid.
#[instrument]
fn scene_mesh(mesh_path: Option<&str>) -> Result<TetMeshDescriptor, Box<dyn std::error::Error>> {
    let mut mesh = match mesh_path {
        Some(path) => TetMeshDescriptor::load(path)?,
        None => TetMeshDescriptor::box_grid(Vec3::new(-0.5, 0.0, -0.5), Vec3::new(1.0, 2.0, 1.0), [2, 4, 2]),
    };
    let (min, _) = mesh.bounding_box();
    mesh.translate(Vec3::new(0.0, 1.0 - min.y, 0.0));
    Ok(mesh)
}

#[instrument]
fn run_headless(
    mesh_path: Option<&str>,
    frames: usize,
    config: Option<&str>,
    substeps: Option<usize>,
    bones: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut params = load_params(config)?;
    if let Some(n) = substeps {
        params.num_substeps = n;
    }
    let mut sim = Simulation::new(params);
    let mesh = scene_mesh(mesh_path)?;

    let id = match bones {
        Some(n) => {
            let (min, max) = mesh.bounding_box();
            let root = Vec3::new((min.x + max.x) * 0.5, min.y, (min.z + max.z) * 0.5);
            let chain = BoneChain::new(root, (max.y - min.y) / n.max(1) as f32, n);
            sim.spawn_bone_bound(&mesh, BodyParams::default(), chain)?
        }
        None => sim.spawn(&mesh, BodyParams::default())?,
    };

    let log_every = (1.0 / sim.params.dt).round().max(1.0) as usize;
    for frame in 1..=frames {
        sim.step();
        if frame % log_every == 0 || frame == frames {
            let (min, max) = sim.bodies()[id.index()].deformable().bounding_box();
            info!(
                frame,
                time = sim.time(),
                kinetic_energy = sim.kinetic_energy(),
                min_y = min.y,
                max_y = max.y,
                "Simulation progress"
            );
        }
    }
    Ok(())
}

fn main() {
    // Initialize tracing subscriber for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Export { input, output } => {
            if let Err(e) = export_mesh(&input, &output) {
                error!(error = %e, "Export failed");
                std::process::exit(1);
            }
        }
        Commands::Run {
            mesh,
            frames,
            config,
            substeps,
            bones,
        } => {
            if let Err(e) = run_headless(mesh.as_deref(), frames, config.as_deref(), substeps, bones) {
                error!(error = %e, "Run failed");
                std::process::exit(1);
            }
        }
        Commands::Demo { mesh, config } => {
            #[cfg(feature = "demo")]
            {
                let result = load_params(config.as_deref())
                    .and_then(|params| Ok((params, scene_mesh(mesh.as_deref())?)))
                    .map(|(params, desc)| demo::run(params, desc));
                if let Err(e) = result {
                    error!(error = %e, "Demo failed");
                    std::process::exit(1);
                }
            }
            #[cfg(not(feature = "demo"))]
            {
                let _ = (mesh, config);
                error!("Built without the `demo` feature; rebuild with --features demo");
                std::process::exit(1);
            }
        }
    }
}
