use tracing::debug;

use crate::comm::{Communicator, tags};
use crate::compositor::Compositor;
use crate::direct_send::DirectSend;
use crate::error::{SortlastError, SortlastResult};
use crate::image::{Image, Region};
use crate::pixel::PixelFormat;

/// Binary-swap compositor: log2(P) pairwise split-and-exchange rounds.
///
/// At round `k` each rank pairs with `rank XOR 2^k`, splits its current
/// region in half, keeps one half and sends the other, then blends the
/// received half into the kept one. After the last round every rank owns a
/// disjoint strip and the strips partition the framebuffer.
///
/// For order-dependent encodings the pair blend treats the lower rank block
/// as the back: painters must distribute geometry so that rank order is
/// back-to-front order.
///
/// Group sizes that are not a power of two fall back to [`DirectSend`];
/// [`BinarySwap::without_fallback`] refuses them with `UnsupportedGroupSize`
/// instead.
#[derive(Clone, Copy, Debug)]
pub struct BinarySwap {
    fallback: bool,
}

impl BinarySwap {
    pub fn new() -> Self {
        Self { fallback: true }
    }

    /// Refuse non-power-of-two groups instead of delegating to direct-send.
    pub fn without_fallback() -> Self {
        Self { fallback: false }
    }
}

impl Default for BinarySwap {
    fn default() -> Self {
        Self::new()
    }
}

impl Compositor for BinarySwap {
    #[tracing::instrument(skip_all, fields(rank = comm.rank(), size = comm.size()))]
    fn compose<F: PixelFormat>(
        &self,
        local: Image<F>,
        comm: &mut Communicator,
    ) -> SortlastResult<Image<F>> {
        let total = local.total_pixels();
        if local.region() != Region::new(0, total) {
            return Err(SortlastError::invalid_region(
                "compose input must cover the full framebuffer",
            ));
        }

        let size = comm.size();
        if size == 1 {
            return Ok(local);
        }
        if !size.is_power_of_two() {
            if self.fallback {
                debug!(size, "group is not a power of two, using direct-send");
                return DirectSend::new().compose(local, comm);
            }
            return Err(SortlastError::UnsupportedGroupSize(size));
        }

        let rank = comm.rank();
        let rounds = size.trailing_zeros();
        let (width, height) = (local.width(), local.height());
        let mut current = local;

        for round in 0..rounds {
            let bit = 1usize << round;
            let partner = rank ^ bit;
            let (low_half, high_half) = current.region().split();
            let keep_low = rank & bit == 0;
            let (kept_half, sent_half) = if keep_low {
                (low_half, high_half)
            } else {
                (high_half, low_half)
            };

            let kept = current.subset(kept_half.begin, kept_half.end)?;
            let outgoing = current.subset(sent_half.begin, sent_half.end)?.serialize();
            drop(current);

            let tag = tags::SWAP_BASE + round;
            comm.send(partner, tag, outgoing)?;
            let incoming = comm.recv(partner, tag)?;
            let expected = kept_half.len() * F::BYTES_PER_PIXEL;
            if incoming.len() != expected {
                return Err(SortlastError::collective(format!(
                    "round {round}: rank {partner} sent {} bytes, expected {expected}",
                    incoming.len()
                )));
            }
            let received =
                Image::<F>::deserialize(&incoming, width, height, kept_half.begin, kept_half.end)?;
            debug!(round, partner, begin = kept_half.begin, end = kept_half.end, "exchanged");

            // The low partner's block spans the lower ranks, so it is the back.
            current = if keep_low {
                let mut mine = kept;
                mine.blend_over(&received)?;
                mine
            } else {
                let mut theirs = received;
                theirs.blend_over(&kept)?;
                theirs
            };
        }
        Ok(current)
    }
}
