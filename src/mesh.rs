use cgmath::{Matrix4, Point3, Transform as _, Vector3};
use serde::{Deserialize, Serialize};

/// One solid-color triangle in world space.
///
/// Colors are straight (non-premultiplied) RGBA in [0, 1]; the painter
/// premultiplies at the fragment boundary when the encoding calls for it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub vertices: [Point3<f32>; 3],
    pub color: [f32; 4],
}

impl Triangle {
    pub fn new(vertices: [Point3<f32>; 3], color: [f32; 4]) -> Self {
        Self { vertices, color }
    }

    pub fn centroid(&self) -> Point3<f32> {
        let [a, b, c] = self.vertices;
        Point3::new(
            (a.x + b.x + c.x) / 3.0,
            (a.y + b.y + c.y) / 3.0,
            (a.z + b.z + c.z) / 3.0,
        )
    }
}

/// A triangle soup plus nothing else; bounds are computed on demand.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub triangles: Vec<Triangle>,
}

impl Mesh {
    pub fn new(triangles: Vec<Triangle>) -> Self {
        Self { triangles }
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Axis-aligned bounds over all vertices; `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Point3<f32>, Point3<f32>)> {
        let mut vertices = self.triangles.iter().flat_map(|t| t.vertices);
        let first = vertices.next()?;
        let mut lo = first;
        let mut hi = first;
        for v in vertices {
            lo = Point3::new(lo.x.min(v.x), lo.y.min(v.y), lo.z.min(v.z));
            hi = Point3::new(hi.x.max(v.x), hi.y.max(v.y), hi.z.max(v.z));
        }
        Some((lo, hi))
    }

    pub fn translate(&mut self, offset: Vector3<f32>) {
        for triangle in &mut self.triangles {
            for vertex in &mut triangle.vertices {
                *vertex += offset;
            }
        }
    }

    /// Scale every color channel, alpha included. Used to make geometry
    /// translucent when compositing in an alpha-blending mode.
    pub fn scale_colors(&mut self, factor: f32) {
        for triangle in &mut self.triangles {
            for channel in &mut triangle.color {
                *channel *= factor;
            }
        }
    }

    /// Copy of the mesh sorted back-to-front by view-space centroid depth.
    ///
    /// Painters use this before rasterizing into an order-dependent encoding.
    pub fn visibility_sort(&self, modelview: Matrix4<f32>) -> Mesh {
        let mut keyed: Vec<(f32, Triangle)> = self
            .triangles
            .iter()
            .map(|triangle| {
                let eye = modelview.transform_point(triangle.centroid());
                (eye.z, *triangle)
            })
            .collect();
        // The camera looks down -z, so the most negative z is the farthest.
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
        Mesh::new(keyed.into_iter().map(|(_, triangle)| triangle).collect())
    }
}
