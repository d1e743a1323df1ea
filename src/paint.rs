use cgmath::{Matrix4, Point3};

use crate::error::SortlastResult;
use crate::image::Image;
use crate::mesh::{Mesh, Triangle};
use crate::pixel::PixelFormat;

/// Rasterizes a mesh into a local framebuffer.
///
/// Fragments are applied through the encoding's blend operator. For
/// order-dependent encodings the painter must process triangles back to
/// front relative to the view.
pub trait Painter {
    fn paint<F: PixelFormat>(
        &self,
        mesh: &Mesh,
        image: &mut Image<F>,
        modelview: Matrix4<f32>,
        projection: Matrix4<f32>,
    ) -> SortlastResult<()>;
}

/// Plain CPU rasterizer: bounding box walk, edge-function coverage,
/// barycentric depth interpolation. No clipping beyond rejecting triangles
/// that reach behind the eye.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimplePainter;

impl Painter for SimplePainter {
    fn paint<F: PixelFormat>(
        &self,
        mesh: &Mesh,
        image: &mut Image<F>,
        modelview: Matrix4<f32>,
        projection: Matrix4<f32>,
    ) -> SortlastResult<()> {
        let sorted;
        let triangles = if F::ORDER_DEPENDENT {
            sorted = mesh.visibility_sort(modelview);
            &sorted.triangles
        } else {
            &mesh.triangles
        };

        let transform = projection * modelview;
        for triangle in triangles {
            rasterize(triangle, transform, image);
        }
        Ok(())
    }
}

fn rasterize<F: PixelFormat>(triangle: &Triangle, transform: Matrix4<f32>, image: &mut Image<F>) {
    let width = image.width();
    let height = image.height();

    let mut screen = [[0.0f32; 3]; 3];
    for (corner, vertex) in screen.iter_mut().zip(triangle.vertices) {
        let clip = transform * vertex.to_homogeneous();
        if clip.w <= 0.0 {
            return;
        }
        let ndc = Point3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w);
        *corner = [
            (ndc.x + 1.0) * 0.5 * width as f32,
            (1.0 - ndc.y) * 0.5 * height as f32,
            ndc.z,
        ];
    }

    let area = edge(screen[0], screen[1], [screen[2][0], screen[2][1]]);
    if area == 0.0 {
        return;
    }

    let min_x = screen.iter().map(|v| v[0]).fold(f32::INFINITY, f32::min);
    let max_x = screen.iter().map(|v| v[0]).fold(f32::NEG_INFINITY, f32::max);
    let min_y = screen.iter().map(|v| v[1]).fold(f32::INFINITY, f32::min);
    let max_y = screen.iter().map(|v| v[1]).fold(f32::NEG_INFINITY, f32::max);

    let x0 = (min_x.floor().max(0.0)) as u32;
    let x1 = (max_x.ceil().min(width as f32)) as u32;
    let y0 = (min_y.floor().max(0.0)) as u32;
    let y1 = (max_y.ceil().min(height as f32)) as u32;

    for py in y0..y1 {
        for px in x0..x1 {
            let at = [px as f32 + 0.5, py as f32 + 0.5];
            let w0 = edge(screen[1], screen[2], at) / area;
            let w1 = edge(screen[2], screen[0], at) / area;
            let w2 = edge(screen[0], screen[1], at) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let depth = w0 * screen[0][2] + w1 * screen[1][2] + w2 * screen[2][2];
            let index = py as usize * width as usize + px as usize;
            image.blend_pixel(index, F::pixel_from_fragment(triangle.color, depth));
        }
    }
}

fn edge(a: [f32; 3], b: [f32; 3], p: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}
