use cgmath::Vector3;
use tracing::debug;

use crate::comm::{Communicator, tags, wire};
use crate::error::SortlastResult;
use crate::mesh::Mesh;

/// Broadcast rank 0's mesh to the whole group, offsetting each rank's copy in
/// a 3D grid so the copies sit side by side.
///
/// `overlap` controls the spacing: 0 leaves copies flush, 1 stacks them on
/// top of each other, negative values spread them apart.
pub fn duplicate(mesh: &Mesh, overlap: f32, comm: &mut Communicator) -> SortlastResult<Mesh> {
    let mut local = if comm.rank() == 0 {
        let bytes = wire::encode(mesh)?;
        for dest in 1..comm.size() {
            comm.send(dest, tags::BROADCAST, bytes.clone())?;
        }
        mesh.clone()
    } else {
        wire::decode(&comm.recv(0, tags::BROADCAST)?)?
    };

    let offset = grid_offset(comm.rank(), comm.size(), &local, overlap);
    debug!(rank = comm.rank(), ?offset, "duplicated mesh");
    local.translate(offset);
    Ok(local)
}

/// Deal rank 0's triangles out as contiguous chunks, one chunk per rank.
pub fn partition(mesh: &Mesh, comm: &mut Communicator) -> SortlastResult<Mesh> {
    let size = comm.size();
    if comm.rank() == 0 {
        let count = mesh.len();
        for dest in 1..size {
            let (begin, end) = chunk_bounds(count, size, dest);
            let chunk = Mesh::new(mesh.triangles[begin..end].to_vec());
            comm.send(dest, tags::SCATTER, wire::encode(&chunk)?)?;
        }
        let (begin, end) = chunk_bounds(count, size, 0);
        Ok(Mesh::new(mesh.triangles[begin..end].to_vec()))
    } else {
        wire::decode(&comm.recv(0, tags::SCATTER)?)
    }
}

fn chunk_bounds(count: usize, size: usize, rank: usize) -> (usize, usize) {
    (rank * count / size, (rank + 1) * count / size)
}

/// Near-cubical grid dimensions holding at least `size` cells.
fn grid_dims(size: usize) -> (usize, usize, usize) {
    let nx = ((size as f64).cbrt().ceil() as usize).max(1);
    let ny = (((size as f64) / nx as f64).sqrt().ceil() as usize).max(1);
    let nz = size.div_ceil(nx * ny);
    (nx, ny, nz)
}

fn grid_offset(rank: usize, size: usize, mesh: &Mesh, overlap: f32) -> Vector3<f32> {
    let Some((lo, hi)) = mesh.bounds() else {
        return Vector3::new(0.0, 0.0, 0.0);
    };
    let extent = hi - lo;
    let (nx, ny, _) = grid_dims(size);
    let ix = rank % nx;
    let iy = (rank / nx) % ny;
    let iz = rank / (nx * ny);
    let step = 1.0 - overlap;
    Vector3::new(
        ix as f32 * extent.x * step,
        iy as f32 * extent.y * step,
        iz as f32 * extent.z * step,
    )
}
