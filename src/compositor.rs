use crate::comm::Communicator;
use crate::error::SortlastResult;
use crate::image::Image;
use crate::pixel::PixelFormat;

/// The narrow contract every composition algorithm satisfies.
///
/// `compose` consumes the rank's full-screen local painting and returns that
/// rank's share of the final pixels. Taken across the whole group the returned
/// regions partition the framebuffer: no pixel is owned twice, none is lost.
///
/// `compose` is a collective. Every rank of the group must call it the same
/// number of times in the same order; the group handle is the only identifier
/// a call carries.
pub trait Compositor {
    fn compose<F: PixelFormat>(
        &self,
        local: Image<F>,
        comm: &mut Communicator,
    ) -> SortlastResult<Image<F>>;
}
