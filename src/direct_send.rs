use crate::comm::{Communicator, tags};
use crate::compositor::Compositor;
use crate::error::{SortlastError, SortlastResult};
use crate::image::Image;
use crate::pixel::PixelFormat;

/// All-to-one compositor, and the fallback for group sizes binary swap cannot
/// handle.
///
/// Every rank ships its full local image to rank 0, which folds them together
/// in ascending rank order (lower rank in back) and then deals the merged
/// image back out as even strips, one per rank.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectSend;

impl DirectSend {
    pub fn new() -> Self {
        Self
    }
}

/// Even split of `total` pixels into `size` strips; exact for any size.
pub(crate) fn strip_bounds(total: usize, size: usize, rank: usize) -> (usize, usize) {
    (rank * total / size, (rank + 1) * total / size)
}

impl Compositor for DirectSend {
    #[tracing::instrument(skip_all, fields(rank = comm.rank(), size = comm.size()))]
    fn compose<F: PixelFormat>(
        &self,
        local: Image<F>,
        comm: &mut Communicator,
    ) -> SortlastResult<Image<F>> {
        let total = local.total_pixels();
        if local.region() != crate::image::Region::new(0, total) {
            return Err(SortlastError::invalid_region(
                "compose input must cover the full framebuffer",
            ));
        }

        let size = comm.size();
        let rank = comm.rank();
        if size == 1 {
            return Ok(local);
        }

        let (width, height) = (local.width(), local.height());
        if rank == 0 {
            let mut merged = local;
            for src in 1..size {
                let bytes = comm.recv(src, tags::DIRECT_BLEND)?;
                let expected = total * F::BYTES_PER_PIXEL;
                if bytes.len() != expected {
                    return Err(SortlastError::collective(format!(
                        "rank {src} sent {} bytes, expected {expected}",
                        bytes.len()
                    )));
                }
                let theirs = Image::<F>::deserialize(&bytes, width, height, 0, total)?;
                // Every later rank goes on top of the ranks already folded in.
                merged.blend_over(&theirs)?;
            }
            for dest in 1..size {
                let (begin, end) = strip_bounds(total, size, dest);
                comm.send(
                    dest,
                    tags::DIRECT_STRIP,
                    merged.subset(begin, end)?.serialize(),
                )?;
            }
            let (begin, end) = strip_bounds(total, size, 0);
            merged.subset(begin, end)
        } else {
            comm.send(0, tags::DIRECT_BLEND, local.serialize())?;
            let (begin, end) = strip_bounds(total, size, rank);
            let bytes = comm.recv(0, tags::DIRECT_STRIP)?;
            Image::<F>::deserialize(&bytes, width, height, begin, end)
        }
    }
}
