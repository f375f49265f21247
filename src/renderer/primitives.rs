//! Vertex and index data for the meshes the demo and tests place into
//! geometry buffers.

use super::vertex::Vertex;

/// Unit quad in the XY plane covering `[0, 1]²`, facing +Z.
pub fn quad() -> (Vec<Vertex>, Vec<u32>) {
    let n = [0.0, 0.0, 1.0];
    let vertices = vec![
        Vertex::new([0.0, 0.0, 0.0], n, [0.0, 1.0]),
        Vertex::new([1.0, 0.0, 0.0], n, [1.0, 1.0]),
        Vertex::new([1.0, 1.0, 0.0], n, [1.0, 0.0]),
        Vertex::new([0.0, 1.0, 0.0], n, [0.0, 0.0]),
    ];
    (vertices, vec![0, 1, 2, 2, 3, 0])
}

/// Cube of edge length 2 centred on the origin, four vertices per face so
/// normals stay flat. Faces wind counter-clockwise seen from outside.
pub fn cube() -> (Vec<Vertex>, Vec<u32>) {
    // (normal, u axis, v axis); u x v == normal keeps the winding outward.
    const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];
    const CORNERS: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, w) in FACES {
        let base = vertices.len() as u32;
        for [a, b] in CORNERS {
            let pos = [0, 1, 2].map(|i| normal[i] + a * u[i] + b * w[i]);
            let uv = [(a + 1.0) * 0.5, (1.0 - b) * 0.5];
            vertices.push(Vertex::new(pos, normal, uv));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }
    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn cube_has_flat_outward_faces() {
        let (vertices, indices) = cube();
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);

        for tri in indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from(vertices[i as usize].pos));
            let face_normal = (b - a).cross(c - a).normalize();
            let stored = Vec3::from(vertices[tri[0] as usize].normal);
            assert!(face_normal.abs_diff_eq(stored, 1e-5), "{face_normal} vs {stored}");
        }
        assert!(vertices
            .iter()
            .all(|v| v.pos.iter().all(|c| c.abs() == 1.0)));
    }

    #[test]
    fn quad_spans_unit_square() {
        let (vertices, indices) = quad();
        assert_eq!(indices, vec![0, 1, 2, 2, 3, 0]);
        assert_eq!(vertices[2].pos, [1.0, 1.0, 0.0]);
    }
}
