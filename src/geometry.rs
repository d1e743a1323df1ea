use std::path::Path;

use cgmath::Point3;

use crate::error::{SortlastError, SortlastResult};
use crate::mesh::{Mesh, Triangle};

const FACE_COLORS: [[f32; 4]; 6] = [
    [1.0, 0.0, 0.0, 1.0],
    [0.0, 1.0, 0.0, 1.0],
    [0.0, 0.0, 1.0, 1.0],
    [1.0, 1.0, 0.0, 1.0],
    [1.0, 0.0, 1.0, 1.0],
    [0.0, 1.0, 1.0, 1.0],
];

/// The canonical test scene: a unit box at the origin, each face a distinct
/// color, two triangles per face.
pub fn make_box() -> Mesh {
    // Corner i has x from bit 0, y from bit 1, z from bit 2.
    let corner = |i: usize| {
        Point3::new(
            if i & 1 == 0 { -0.5 } else { 0.5 },
            if i & 2 == 0 { -0.5 } else { 0.5 },
            if i & 4 == 0 { -0.5 } else { 0.5 },
        )
    };

    let faces: [[usize; 4]; 6] = [
        [0, 2, 6, 4], // -x
        [1, 3, 7, 5], // +x
        [0, 1, 5, 4], // -y
        [2, 3, 7, 6], // +y
        [0, 1, 3, 2], // -z
        [4, 5, 7, 6], // +z
    ];

    let mut triangles = Vec::with_capacity(12);
    for (face, color) in faces.iter().zip(FACE_COLORS) {
        let [a, b, c, d] = face.map(corner);
        triangles.push(Triangle::new([a, b, c], color));
        triangles.push(Triangle::new([a, c, d], color));
    }
    Mesh::new(triangles)
}

/// Load a binary STL file. Triangles get a uniform light-gray color; STL
/// carries no color of its own worth trusting.
pub fn read_stl(path: &Path) -> SortlastResult<Mesh> {
    let bytes = std::fs::read(path)
        .map_err(|e| SortlastError::geometry(format!("read '{}': {e}", path.display())))?;
    if bytes.len() < 84 {
        return Err(SortlastError::geometry(format!(
            "'{}' is too short to be a binary STL file",
            path.display()
        )));
    }

    let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
    let expected = 84 + count * 50;
    if bytes.len() < expected {
        return Err(SortlastError::geometry(format!(
            "'{}' declares {count} triangles but holds only {} bytes of {expected}",
            path.display(),
            bytes.len()
        )));
    }

    let mut triangles = Vec::with_capacity(count);
    for record in bytes[84..expected].chunks_exact(50) {
        // Skip the 12-byte normal; vertices are 3 consecutive LE f32 triples.
        let vertex = |at: usize| {
            Point3::new(
                le_f32(record, at),
                le_f32(record, at + 4),
                le_f32(record, at + 8),
            )
        };
        triangles.push(Triangle::new(
            [vertex(12), vertex(24), vertex(36)],
            [0.8, 0.8, 0.8, 1.0],
        ));
    }
    Ok(Mesh::new(triangles))
}

fn le_f32(bytes: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
