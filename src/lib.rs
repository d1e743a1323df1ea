//! Sort-last parallel image compositing mini-app.
//!
//! Every rank rasterizes its share of a triangle mesh into a full-screen
//! local framebuffer; a binary-swap exchange then leaves each rank holding a
//! disjoint strip of the final image, and a gather reassembles the strips on
//! rank 0. Ranks run as OS threads joined by a reliable FIFO message mesh,
//! one endpoint per rank.
#![forbid(unsafe_code)]

mod binary_swap;
mod comm;
mod compositor;
mod direct_send;
mod distribute;
mod error;
mod geometry;
mod image;
mod mesh;
mod paint;
mod pixel;
mod run;
mod timing;

pub use binary_swap::BinarySwap;
pub use comm::{tags, Communicator};
pub use compositor::Compositor;
pub use direct_send::DirectSend;
pub use distribute::{duplicate, partition};
pub use error::{SortlastError, SortlastResult};
pub use geometry::{make_box, read_stl};
pub use image::{Image, Region};
pub use mesh::{Mesh, Triangle};
pub use paint::{Painter, SimplePainter};
pub use pixel::{
    FormatKind, PixelFormat, PremulRgba8, PremulRgbaF32, RgbF32Depth, RgbF32DepthPixel,
    Rgba8Alpha, Rgba8Depth, Rgba8DepthPixel, RgbaF32Alpha,
};
pub use run::{CompositorKind, DistributionMode, GeometrySource, RunOptions, run};
pub use timing::{Stopwatch, TimingReport};
