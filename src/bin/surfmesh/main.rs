//! surfmesh CLI - surface mesh processing command-line tool.
//!
//! Usage: surfmesh [-v...] <COMMAND> [OPTIONS] <INPUT> [OUTPUT]
//!
//! Run `surfmesh --help` for available commands.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;

use surfmesh::algo::boolean::{boolean, BooleanOp, BooleanOptions};
use surfmesh::algo::clip::clip_axis;
use surfmesh::algo::hull::convex_hull;
use surfmesh::algo::primitives::make_cube;
use surfmesh::algo::remesh::{self, RemeshOptions};
use surfmesh::algo::repair::{fill_holes, num_self_intersections};
use surfmesh::algo::smooth::{self, SmoothOptions};
use surfmesh::algo::Progress;
use surfmesh::io;
use surfmesh::mesh::HalfEdgeMesh;
use surfmesh::nalgebra::Point3;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "surfmesh")]
#[command(author, version, about = "Surface mesh processing CLI", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display mesh information
    Info {
        /// Input mesh file
        input: PathBuf,

        /// Also count self-intersections
        #[arg(long)]
        intersections: bool,
    },

    /// Remesh toward a uniform edge length
    Remesh {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,

        /// Target edge length (default: average edge length)
        #[arg(short = 'l', long)]
        target_length: Option<f64>,

        /// Number of iterations
        #[arg(short, long, default_value = "5")]
        iterations: usize,

        /// Keep boundary edges and vertices fixed
        #[arg(long)]
        protect_borders: bool,

        /// Use single-threaded execution
        #[arg(long)]
        sequential: bool,
    },

    /// Smooth a mesh
    Smooth {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,

        /// Smoothing method
        #[arg(short, long, value_enum, default_value = "taubin")]
        method: SmoothMethod,

        /// Number of iterations
        #[arg(short, long, default_value = "1")]
        iterations: usize,

        /// Laplacian smoothing factor
        #[arg(short, long, default_value = "0.5")]
        factor: f64,

        /// Keep boundary vertices fixed
        #[arg(long)]
        preserve_boundary: bool,

        /// Use single-threaded execution
        #[arg(long)]
        sequential: bool,
    },

    /// Close every hole
    FillHoles {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,
    },

    /// Combine two closed meshes
    Boolean {
        /// Operation
        #[arg(value_enum)]
        op: BooleanKind,

        /// First operand
        a: PathBuf,

        /// Second operand
        b: PathBuf,

        /// Output mesh file
        output: PathBuf,

        /// Snapping tolerance relative to the combined bounding box diagonal
        #[arg(long, default_value = "1e-9")]
        snap: f64,
    },

    /// Convex hull of the vertices
    Hull {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,
    },

    /// Cut the mesh with an axis-aligned plane
    Clip {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,

        /// Plane axis
        #[arg(short, long, value_enum)]
        axis: Axis,

        /// Plane position along the axis
        #[arg(short, long, default_value = "0", allow_hyphen_values = true)]
        offset: f64,

        /// Remove the part below the plane instead of above it
        #[arg(long)]
        below: bool,

        /// Leave the cut open instead of capping it
        #[arg(long)]
        open: bool,
    },

    /// Generate an axis-aligned box
    Cube {
        /// Output mesh file
        output: PathBuf,

        /// Minimum corner
        #[arg(long, num_args = 3, default_values_t = [0.0, 0.0, 0.0], allow_hyphen_values = true)]
        min: Vec<f64>,

        /// Maximum corner
        #[arg(long, num_args = 3, default_values_t = [1.0, 1.0, 1.0], allow_hyphen_values = true)]
        max: Vec<f64>,

        /// Grid cells per side
        #[arg(short, long, default_value = "1")]
        n: usize,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum SmoothMethod {
    /// Uniform Laplacian smoothing
    Laplacian,
    /// Taubin smoothing (shrinkage-resistant)
    Taubin,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum BooleanKind {
    /// Everything inside either mesh
    Union,
    /// Everything inside both meshes
    Intersection,
    /// The first mesh minus the second
    Difference,
}

impl From<BooleanKind> for BooleanOp {
    fn from(kind: BooleanKind) -> Self {
        match kind {
            BooleanKind::Union => BooleanOp::Union,
            BooleanKind::Intersection => BooleanOp::Intersection,
            BooleanKind::Difference => BooleanOp::Difference,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Axis {
    X,
    Y,
    Z,
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// `RUST_LOG` overrides the level picked by `-v`.
fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::builder()
        .filter_level(level)
        .format_timestamp(None)
        .parse_default_env()
        .init();
}

fn run(cli: Cli) -> CliResult {
    match cli.command {
        Commands::Info { input, intersections } => cmd_info(&input, intersections),
        Commands::Remesh {
            input,
            output,
            target_length,
            iterations,
            protect_borders,
            sequential,
        } => cmd_remesh(&input, &output, target_length, iterations, protect_borders, sequential),
        Commands::Smooth {
            input,
            output,
            method,
            iterations,
            factor,
            preserve_boundary,
            sequential,
        } => {
            let options = SmoothOptions::default()
                .with_preserve_boundary(preserve_boundary)
                .with_parallel(!sequential);
            cmd_smooth(&input, &output, method, iterations, factor, &options)
        }
        Commands::FillHoles { input, output } => cmd_fill_holes(&input, &output),
        Commands::Boolean { op, a, b, output, snap } => cmd_boolean(op, &a, &b, &output, snap),
        Commands::Hull { input, output } => cmd_hull(&input, &output),
        Commands::Clip {
            input,
            output,
            axis,
            offset,
            below,
            open,
        } => cmd_clip(&input, &output, axis as usize, offset, !below, !open),
        Commands::Cube { output, min, max, n } => cmd_cube(&output, &min, &max, n),
    }
}

/// Create a progress reporter that draws a bar on stderr.
fn create_progress() -> Progress {
    // Highest percentage drawn so far; the bar never moves backwards.
    let max_percent = Arc::new(AtomicUsize::new(0));

    Progress::new(move |current, total, message| {
        if total == 0 {
            return;
        }
        let raw_percent = if current >= total {
            100
        } else {
            ((current * 100) + (total / 2)) / total
        };
        let previous = max_percent.fetch_max(raw_percent, Ordering::Relaxed);
        if raw_percent <= previous && raw_percent != 100 {
            return;
        }

        let bar_width = 30;
        let filled = (raw_percent * bar_width) / 100;
        eprint!(
            "\r[{}{}] {:3}% {}",
            "=".repeat(filled),
            " ".repeat(bar_width - filled),
            raw_percent,
            message
        );
        let _ = std::io::stderr().flush();
        if current >= total {
            eprintln!();
        }
    })
}

fn load(path: &Path) -> Result<HalfEdgeMesh, Box<dyn std::error::Error>> {
    let mesh: HalfEdgeMesh = io::load(path)?;
    log::info!(
        "loaded {}: {} vertices, {} faces",
        path.display(),
        mesh.num_vertices(),
        mesh.num_faces()
    );
    Ok(mesh)
}

fn save(mesh: &HalfEdgeMesh, path: &Path, started: Instant) -> CliResult {
    io::save(mesh, path)?;
    log::info!(
        "saved {}: {} vertices, {} faces ({:.2?})",
        path.display(),
        mesh.num_vertices(),
        mesh.num_faces(),
        started.elapsed()
    );
    Ok(())
}

fn cmd_info(input: &Path, intersections: bool) -> CliResult {
    let mesh = load(input)?;

    println!("File: {}", input.display());
    println!("Vertices: {}", mesh.num_vertices());
    println!("Edges: {}", mesh.num_edges());
    println!("Faces: {}", mesh.num_faces());
    println!("Euler characteristic: {}", mesh.euler_characteristic());
    println!("Components: {}", mesh.connected_components().len());
    println!("Surface area: {:.6}", mesh.surface_area());

    if let Some(bbox) = mesh.bounding_box() {
        let (min, max) = (bbox.min, bbox.max);
        println!(
            "Bounding box: ({:.3}, {:.3}, {:.3}) to ({:.3}, {:.3}, {:.3})",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
    }
    if let Some(stats) = remesh::edge_length_stats(&mesh) {
        println!(
            "Edge length: min {:.6}, mean {:.6}, max {:.6}",
            stats.min, stats.mean, stats.max
        );
    }

    if !mesh.is_triangle_mesh() {
        println!("Mesh type: Polygon mesh");
    }
    let holes = mesh.boundary_loops().len();
    if holes == 0 {
        println!("Topology: Closed");
        println!("Volume: {:.6}", mesh.volume());
    } else {
        println!("Topology: Open ({} boundary loops)", holes);
    }
    if intersections {
        println!("Self-intersections: {}", num_self_intersections(&mesh));
    }
    Ok(())
}

fn cmd_remesh(
    input: &Path,
    output: &Path,
    target_length: Option<f64>,
    iterations: usize,
    protect_borders: bool,
    sequential: bool,
) -> CliResult {
    let mut mesh = load(input)?;
    let target = target_length.unwrap_or_else(|| remesh::average_edge_length(&mesh));
    log::info!("isotropic remeshing to edge length {:.6}, {} iterations", target, iterations);

    let options = RemeshOptions::with_target_length(target)
        .with_iterations(iterations)
        .with_protect_borders(protect_borders)
        .with_parallel(!sequential);
    let started = Instant::now();
    remesh::isotropic_remeshing_with_progress(&mut mesh, &options, &create_progress())?;
    save(&mesh, output, started)
}

fn cmd_smooth(
    input: &Path,
    output: &Path,
    method: SmoothMethod,
    iterations: usize,
    factor: f64,
    options: &SmoothOptions,
) -> CliResult {
    let mut mesh = load(input)?;
    let started = Instant::now();
    match method {
        SmoothMethod::Laplacian => {
            log::info!("Laplacian smoothing, {} iterations, factor {}", iterations, factor);
            smooth::smooth_laplacian(&mut mesh, factor, iterations, options);
        }
        SmoothMethod::Taubin => {
            log::info!("Taubin smoothing, {} iterations", iterations);
            smooth::smooth_taubin_with_progress(&mut mesh, iterations, options, &create_progress());
        }
    }
    save(&mesh, output, started)
}

fn cmd_fill_holes(input: &Path, output: &Path) -> CliResult {
    let mut mesh = load(input)?;
    let started = Instant::now();
    let filled = fill_holes(&mut mesh);
    println!("Filled {} holes", filled);
    save(&mesh, output, started)
}

fn cmd_boolean(op: BooleanKind, a: &Path, b: &Path, output: &Path, snap: f64) -> CliResult {
    let (a, b) = (load(a)?, load(b)?);
    let options = BooleanOptions::default().with_snap_tolerance(snap);
    let started = Instant::now();
    let result = boolean(&a, &b, op.into(), &options)?;
    if result.num_faces() == 0 {
        log::warn!("the result is empty");
    }
    save(&result, output, started)
}

fn cmd_hull(input: &Path, output: &Path) -> CliResult {
    let mesh = load(input)?;
    let started = Instant::now();
    let hull = convex_hull(&mesh)?;
    save(&hull, output, started)
}

fn cmd_clip(input: &Path, output: &Path, axis: usize, offset: f64, positive: bool, keep_closed: bool) -> CliResult {
    let mut mesh = load(input)?;
    let started = Instant::now();
    let caps = clip_axis(&mut mesh, axis, offset, positive, keep_closed)?;
    log::info!("closed the cut with {} caps", caps);
    save(&mesh, output, started)
}

fn cmd_cube(output: &Path, min: &[f64], max: &[f64], n: usize) -> CliResult {
    let started = Instant::now();
    let (p0, p1) = (
        Point3::new(min[0], min[1], min[2]),
        Point3::new(max[0], max[1], max[2]),
    );
    let mesh: HalfEdgeMesh = make_cube(&p0, &p1, n)?;
    save(&mesh, output, started)
}
