use std::path::{Path, PathBuf};
use std::thread;

use anyhow::Context as _;
use cgmath::{Deg, EuclideanSpace as _, InnerSpace as _, Matrix4, Vector3, perspective};
use tracing::{debug, info};

use crate::binary_swap::BinarySwap;
use crate::comm::Communicator;
use crate::compositor::Compositor;
use crate::direct_send::DirectSend;
use crate::distribute;
use crate::error::{SortlastError, SortlastResult};
use crate::geometry::{make_box, read_stl};
use crate::image::Image;
use crate::mesh::Mesh;
use crate::paint::{Painter as _, SimplePainter};
use crate::pixel::{FormatKind, PixelFormat, RgbF32Depth, Rgba8Alpha, Rgba8Depth, RgbaF32Alpha};
use crate::timing::{Stopwatch, TimingReport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositorKind {
    BinarySwap,
    DirectSend,
}

impl CompositorKind {
    pub fn name(self) -> &'static str {
        match self {
            CompositorKind::BinarySwap => "binary-swap",
            CompositorKind::DirectSend => "direct-send",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GeometrySource {
    Box,
    StlFile(PathBuf),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DistributionMode {
    /// Every rank gets the whole mesh, offset in a 3D grid.
    Duplicate { overlap: f32 },
    /// Triangles are dealt out so each lands on exactly one rank.
    Partition,
}

#[derive(Clone, Debug)]
pub struct RunOptions {
    pub width: u32,
    pub height: u32,
    pub ranks: usize,
    pub format: FormatKind,
    pub compositor: CompositorKind,
    pub geometry: GeometrySource,
    pub distribution: DistributionMode,
    pub write_images: bool,
    pub image_dir: PathBuf,
    pub timing_output: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            width: 1100,
            height: 900,
            ranks: 4,
            format: FormatKind::Rgba8Depth,
            compositor: CompositorKind::BinarySwap,
            geometry: GeometrySource::Box,
            distribution: DistributionMode::Duplicate { overlap: -0.05 },
            write_images: false,
            image_dir: PathBuf::from("."),
            timing_output: None,
        }
    }
}

/// Paint, compose, and gather one frame across `opts.ranks` rank threads.
///
/// Rank 0 ends up with the full composited image and writes the outputs; any
/// rank's failure fails the whole run.
pub fn run(opts: &RunOptions) -> SortlastResult<()> {
    match opts.format {
        FormatKind::Rgba8Depth => run_typed::<Rgba8Depth>(opts),
        FormatKind::RgbF32Depth => run_typed::<RgbF32Depth>(opts),
        FormatKind::Rgba8Alpha => run_typed::<Rgba8Alpha>(opts),
        FormatKind::RgbaF32Alpha => run_typed::<RgbaF32Alpha>(opts),
    }
}

fn run_typed<F: PixelFormat>(opts: &RunOptions) -> SortlastResult<()> {
    if opts.ranks == 0 {
        return Err(SortlastError::UnsupportedGroupSize(0));
    }

    let joined = thread::scope(|scope| {
        let handles: Vec<_> = Communicator::mesh(opts.ranks)
            .into_iter()
            .map(|comm| scope.spawn(move || run_rank::<F>(opts, comm)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join())
            .collect::<Vec<_>>()
    });

    for outcome in joined {
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(SortlastError::collective("a rank panicked")),
        }
    }
    Ok(())
}

fn run_rank<F: PixelFormat>(opts: &RunOptions, mut comm: Communicator) -> SortlastResult<()> {
    let result = run_rank_inner::<F>(opts, &mut comm);
    if let Err(err) = &result {
        comm.abort(&err.to_string());
    }
    result
}

fn run_rank_inner<F: PixelFormat>(opts: &RunOptions, comm: &mut Communicator) -> SortlastResult<()> {
    let rank = comm.rank();

    let seed_mesh = if rank == 0 {
        match &opts.geometry {
            GeometrySource::Box => make_box(),
            GeometrySource::StlFile(path) => read_stl(path)?,
        }
    } else {
        Mesh::default()
    };

    let mut local_mesh = match opts.distribution {
        DistributionMode::Duplicate { overlap } => {
            distribute::duplicate(&seed_mesh, overlap, comm)?
        }
        DistributionMode::Partition => distribute::partition(&seed_mesh, comm)?,
    };
    drop(seed_mesh);

    if F::ORDER_DEPENDENT {
        // Alpha compositing over opaque geometry degenerates to painter's
        // algorithm; halve all colors so the blending shows.
        local_mesh.scale_colors(0.5);
    }

    let bounds = comm.allreduce(local_mesh.bounds(), |a, b| match (a, b) {
        (Some((alo, ahi)), Some((blo, bhi))) => Some((
            cgmath::Point3::new(alo.x.min(blo.x), alo.y.min(blo.y), alo.z.min(blo.z)),
            cgmath::Point3::new(ahi.x.max(bhi.x), ahi.y.max(bhi.y), ahi.z.max(bhi.z)),
        )),
        (a, None) => a,
        (None, b) => b,
    })?;
    let num_triangles = comm.allreduce(local_mesh.len(), |a, b| a + b)?;
    let Some((lo, hi)) = bounds else {
        return Err(SortlastError::geometry("no triangles on any rank"));
    };
    debug!(rank, num_triangles, "geometry distributed");

    // Same staging as the reference scene: back the camera off by 1.5x the
    // bounds diagonal and tilt for an interesting view.
    let extent = hi - lo;
    let center = lo.midpoint(hi);
    let dist = extent.magnitude();
    let modelview = Matrix4::from_translation(Vector3::new(0.0, 0.0, -1.5 * dist))
        * Matrix4::from_angle_x(Deg(15.0))
        * Matrix4::from_angle_y(Deg(25.0))
        * Matrix4::from_translation(center.to_vec() * -1.0);
    let aspect = opts.width as f32 / opts.height as f32;
    let projection = perspective(Deg(45.0), aspect, dist / 3.0, 2.0 * dist);

    let mut local_image = Image::<F>::full(opts.width, opts.height)?;

    let total_watch = Stopwatch::start();
    let paint_watch = Stopwatch::start();
    SimplePainter.paint(&local_mesh, &mut local_image, modelview, projection)?;
    let paint_seconds = paint_watch.seconds();

    // Keep the composite timing honest: no rank starts the clock while a
    // peer is still painting.
    comm.barrier()?;

    let local_dump = opts.write_images.then(|| local_image.clone());

    let composite_watch = Stopwatch::start();
    let strip = match opts.compositor {
        CompositorKind::BinarySwap => BinarySwap::new().compose(local_image, comm)?,
        CompositorKind::DirectSend => DirectSend::new().compose(local_image, comm)?,
    };
    let composite = strip.gather(0, comm)?;
    let composite_seconds = composite_watch.seconds();
    let total_seconds = total_watch.seconds();

    if opts.write_images {
        if let Some(local) = &local_dump {
            save_png(local, &opts.image_dir.join(format!("local_painting{rank}.png")))?;
        }
        if rank == 0 {
            save_png(&composite, &opts.image_dir.join("composite.png"))?;
        }
    }

    if rank == 0 {
        info!(
            ranks = comm.size(),
            num_triangles, paint_seconds, composite_seconds, "run complete"
        );
        if let Some(path) = &opts.timing_output {
            let report = TimingReport {
                composite_algorithm: opts.compositor.name().to_string(),
                num_processes: comm.size(),
                image_width: opts.width,
                image_height: opts.height,
                pixel_format: F::NAME.to_string(),
                geometry: match &opts.geometry {
                    GeometrySource::Box => "box".to_string(),
                    GeometrySource::StlFile(path) => path.display().to_string(),
                },
                geometry_distribution: match opts.distribution {
                    DistributionMode::Duplicate { .. } => "duplicate".to_string(),
                    DistributionMode::Partition => "partition".to_string(),
                },
                rendering_order_dependent: F::ORDER_DEPENDENT,
                num_triangles,
                paint_seconds,
                composite_seconds,
                total_seconds,
            };
            report.write_json(path)?;
        }
    }
    Ok(())
}

fn save_png<F: PixelFormat>(image: &Image<F>, path: &Path) -> SortlastResult<()> {
    let total = image.total_pixels();
    let mut rgba = Vec::with_capacity(total * 4);
    for index in 0..total {
        rgba.extend_from_slice(&F::pixel_to_rgba8(image.pixel_at(index)));
    }
    ::image::save_buffer_with_format(
        path,
        &rgba,
        image.width(),
        image.height(),
        ::image::ColorType::Rgba8,
        ::image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", path.display()))?;
    Ok(())
}
