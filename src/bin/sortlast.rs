use std::path::PathBuf;

use anyhow::Context as _;
use clap::{ArgAction, Parser, ValueEnum};
use sortlast::{
    CompositorKind, DistributionMode, FormatKind, GeometrySource, RunOptions, run,
};

#[derive(Parser, Debug)]
#[command(name = "sortlast", version, about = "Sort-last parallel image compositing mini-app")]
struct Cli {
    /// Width of the image.
    #[arg(long, default_value_t = 1100)]
    width: u32,

    /// Height of the image.
    #[arg(long, default_value_t = 900)]
    height: u32,

    /// Number of ranks in the compositing group, each its own thread.
    #[arg(long, default_value_t = 4)]
    ranks: usize,

    /// Color channel storage.
    #[arg(long, value_enum, default_value_t = ColorFormat::Ubyte)]
    color_format: ColorFormat,

    /// Depth buffer storage; `none` switches compositing to alpha blending.
    #[arg(long, value_enum, default_value_t = DepthFormat::Float)]
    depth_format: DepthFormat,

    /// Composition algorithm.
    #[arg(long, value_enum, default_value_t = Algorithm::BinarySwap)]
    compositor: Algorithm,

    /// Geometry to render.
    #[arg(long, value_enum, default_value_t = Geometry::Box)]
    geometry: Geometry,

    /// STL file to render with `--geometry stl`.
    #[arg(long)]
    stl_file: Option<PathBuf>,

    /// How geometry is spread across ranks.
    #[arg(long, value_enum, default_value_t = Distribution::Duplicate)]
    distribution: Distribution,

    /// Spacing of duplicated geometry: 0 is flush, 1 fully overlapping,
    /// negative values space copies apart. Ignored with `--distribution divide`.
    #[arg(long, default_value_t = -0.05, allow_negative_numbers = true)]
    overlap: f32,

    /// Write each rank's local painting and the composited image.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    write_images: bool,

    /// Directory for the output images.
    #[arg(long, default_value = ".")]
    image_dir: PathBuf,

    /// Timing report destination (JSON).
    #[arg(long, default_value = "timing.json")]
    timing_output: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ColorFormat {
    Ubyte,
    Float,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DepthFormat {
    Float,
    None,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Algorithm {
    BinarySwap,
    DirectSend,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Geometry {
    Box,
    Stl,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Distribution {
    Duplicate,
    Divide,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let format = match (cli.color_format, cli.depth_format) {
        (ColorFormat::Ubyte, DepthFormat::Float) => FormatKind::Rgba8Depth,
        (ColorFormat::Float, DepthFormat::Float) => FormatKind::RgbF32Depth,
        (ColorFormat::Ubyte, DepthFormat::None) => FormatKind::Rgba8Alpha,
        (ColorFormat::Float, DepthFormat::None) => FormatKind::RgbaF32Alpha,
    };

    let geometry = match cli.geometry {
        Geometry::Box => GeometrySource::Box,
        Geometry::Stl => GeometrySource::StlFile(
            cli.stl_file
                .context("--geometry stl requires --stl-file")?,
        ),
    };

    let opts = RunOptions {
        width: cli.width,
        height: cli.height,
        ranks: cli.ranks,
        format,
        compositor: match cli.compositor {
            Algorithm::BinarySwap => CompositorKind::BinarySwap,
            Algorithm::DirectSend => CompositorKind::DirectSend,
        },
        geometry,
        distribution: match cli.distribution {
            Distribution::Duplicate => DistributionMode::Duplicate {
                overlap: cli.overlap,
            },
            Distribution::Divide => DistributionMode::Partition,
        },
        write_images: cli.write_images,
        image_dir: cli.image_dir,
        timing_output: Some(cli.timing_output),
    };

    run(&opts)?;
    Ok(())
}
