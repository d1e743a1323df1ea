use serde::{Deserialize, Serialize};

use crate::comm::{Communicator, tags, wire};
use crate::error::{SortlastError, SortlastResult};
use crate::pixel::PixelFormat;

/// Half-open pixel-index range [begin, end) within a full framebuffer.
///
/// Index `i` maps to row `i / width`, column `i % width`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub begin: usize,
    pub end: usize,
}

impl Region {
    pub fn new(begin: usize, end: usize) -> Region {
        Region { begin, end }
    }

    pub fn len(self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(self) -> bool {
        self.begin == self.end
    }

    pub fn contains(self, index: usize) -> bool {
        self.begin <= index && index < self.end
    }

    pub fn intersect(self, other: Region) -> Region {
        let begin = self.begin.max(other.begin);
        let end = self.end.min(other.end).max(begin);
        Region { begin, end }
    }

    /// Split at the midpoint: ([begin, mid), [mid, end)).
    pub fn split(self) -> (Region, Region) {
        let mid = self.begin + self.len() / 2;
        (Region::new(self.begin, mid), Region::new(mid, self.end))
    }
}

/// Rectangular window of pixels plus the contiguous region actually stored.
///
/// Pixels outside the region are logically the clear value and are never
/// stored. All ranks of one run agree on `width`, `height`, and the encoding.
#[derive(Clone, Debug, PartialEq)]
pub struct Image<F: PixelFormat> {
    width: u32,
    height: u32,
    region: Region,
    pixels: Vec<F::Pixel>,
}

#[derive(Serialize, Deserialize)]
struct StripFrame {
    begin: u64,
    end: u64,
    payload: Vec<u8>,
}

impl<F: PixelFormat> Image<F> {
    /// Allocate storage for `[begin, end)`, every pixel set to clear.
    pub fn new(width: u32, height: u32, begin: usize, end: usize) -> SortlastResult<Self> {
        let total = width as usize * height as usize;
        if begin > end || end > total {
            return Err(SortlastError::invalid_region(format!(
                "[{begin}, {end}) does not fit a {width}x{height} framebuffer of {total} pixels"
            )));
        }
        Ok(Self {
            width,
            height,
            region: Region::new(begin, end),
            pixels: vec![F::clear_pixel(); end - begin],
        })
    }

    /// Full-framebuffer image: region `[0, width * height)`.
    pub fn full(width: u32, height: u32) -> SortlastResult<Self> {
        Self::new(width, height, 0, width as usize * height as usize)
    }

    /// Zero-pixel image, the non-root result of a gather.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            region: Region::new(0, 0),
            pixels: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn total_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn clear(&mut self) {
        self.pixels.fill(F::clear_pixel());
    }

    /// The pixel at a full-framebuffer index; clear outside the region.
    pub fn pixel_at(&self, index: usize) -> F::Pixel {
        if self.region.contains(index) {
            self.pixels[index - self.region.begin]
        } else {
            F::clear_pixel()
        }
    }

    /// Store a pixel. Indices outside the region are not stored and the write
    /// is lost, matching the background semantics of uncovered pixels.
    pub fn set_pixel(&mut self, index: usize, pixel: F::Pixel) {
        if self.region.contains(index) {
            self.pixels[index - self.region.begin] = pixel;
        }
    }

    /// Apply a fragment through the blend operator, fragment in front.
    pub fn blend_pixel(&mut self, index: usize, fragment: F::Pixel) {
        if self.region.contains(index) {
            let at = index - self.region.begin;
            self.pixels[at] = F::blend(fragment, self.pixels[at]);
        }
    }

    /// Pointwise-blend `front` over `self` on the intersection of the two
    /// regions; pixels outside the intersection are unchanged.
    pub fn blend_over(&mut self, front: &Self) -> SortlastResult<()> {
        if self.width != front.width || self.height != front.height {
            return Err(SortlastError::incompatible_images(format!(
                "{}x{} vs {}x{}",
                self.width, self.height, front.width, front.height
            )));
        }
        let overlap = self.region.intersect(front.region);
        for index in overlap.begin..overlap.end {
            let merged = F::blend(
                front.pixels[index - front.region.begin],
                self.pixels[index - self.region.begin],
            );
            self.pixels[index - self.region.begin] = merged;
        }
        Ok(())
    }

    /// Copy of `[begin, end) ∩ region`.
    pub fn subset(&self, begin: usize, end: usize) -> SortlastResult<Self> {
        let total = self.total_pixels();
        if begin > end || end > total {
            return Err(SortlastError::invalid_region(format!(
                "subset [{begin}, {end}) does not fit {total} pixels"
            )));
        }
        let window = self.region.intersect(Region::new(begin, end));
        let pixels = if window.is_empty() {
            Vec::new()
        } else {
            self.pixels[window.begin - self.region.begin..window.end - self.region.begin].to_vec()
        };
        Ok(Self {
            width: self.width,
            height: self.height,
            region: window,
            pixels,
        })
    }

    /// Byte-exact host-order serialization of the stored pixels.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * F::BYTES_PER_PIXEL);
        F::encode_pixels(&self.pixels, &mut out);
        out
    }

    /// Inverse of [`Image::serialize`]: `deserialize(serialize(i), ..) == i`.
    pub fn deserialize(
        bytes: &[u8],
        width: u32,
        height: u32,
        begin: usize,
        end: usize,
    ) -> SortlastResult<Self> {
        let mut image = Self::new(width, height, begin, end)?;
        let pixels = F::decode_pixels(bytes)?;
        if pixels.len() != image.region.len() {
            return Err(SortlastError::collective(format!(
                "decoded {} pixels for a region of {}",
                pixels.len(),
                image.region.len()
            )));
        }
        image.pixels = pixels;
        Ok(image)
    }

    /// Collective reassembly of disjoint strips onto `root`.
    ///
    /// Every rank contributes its region; the caller regions must partition
    /// the full framebuffer exactly. Root returns the assembled full-region
    /// image, everyone else an empty one.
    pub fn gather(&self, root: usize, comm: &mut Communicator) -> SortlastResult<Image<F>> {
        if comm.rank() != root {
            let frame = StripFrame {
                begin: self.region.begin as u64,
                end: self.region.end as u64,
                payload: self.serialize(),
            };
            comm.send(root, tags::GATHER, wire::encode(&frame)?)?;
            return Ok(Self::empty(self.width, self.height));
        }

        let mut strips: Vec<Image<F>> = Vec::with_capacity(comm.size() - 1);
        for src in 0..comm.size() {
            if src == root {
                continue;
            }
            let frame: StripFrame = wire::decode(&comm.recv(src, tags::GATHER)?)?;
            strips.push(Self::deserialize(
                &frame.payload,
                self.width,
                self.height,
                frame.begin as usize,
                frame.end as usize,
            )?);
        }

        let mut regions: Vec<Region> = strips.iter().map(|s| s.region).collect();
        regions.push(self.region);
        check_partition(&mut regions, self.total_pixels())?;

        let mut full = Self::full(self.width, self.height)?;
        full.splice(self);
        for strip in &strips {
            full.splice(strip);
        }
        Ok(full)
    }

    /// Copy another image's stored pixels into place. The other region must
    /// lie inside this one.
    fn splice(&mut self, part: &Self) {
        let at = part.region.begin - self.region.begin;
        self.pixels[at..at + part.pixels.len()].copy_from_slice(&part.pixels);
    }
}

fn check_partition(regions: &mut [Region], total: usize) -> SortlastResult<()> {
    regions.sort_by_key(|r| r.begin);
    let mut covered = 0;
    for region in regions.iter().filter(|r| !r.is_empty()) {
        if region.begin < covered {
            return Err(SortlastError::non_partitioning(format!(
                "[{}, {}) overlaps pixels below {covered}",
                region.begin, region.end
            )));
        }
        if region.begin > covered {
            return Err(SortlastError::non_partitioning(format!(
                "pixels [{covered}, {}) are covered by no rank",
                region.begin
            )));
        }
        covered = region.end;
    }
    if covered != total {
        return Err(SortlastError::non_partitioning(format!(
            "pixels [{covered}, {total}) are covered by no rank"
        )));
    }
    Ok(())
}
