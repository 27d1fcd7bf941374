use mikktspace::{generate_tangents, Geometry};

use crate::{error::AssetError, mesh::Vertex, Result};

/// Fills in MikkTSpace tangents for an unindexed triangle list, where every
/// three consecutive vertices form one face.
pub fn generate_tangents_for_triangles(vertices: &mut [Vertex]) -> Result<()> {
    if vertices.len() % 3 != 0 {
        return Err(AssetError::malformed(
            "vertex count must be a multiple of 3 (triangles)",
        ));
    }

    struct TriangleList<'a> {
        vertices: &'a mut [Vertex],
    }

    impl Geometry for TriangleList<'_> {
        fn num_faces(&self) -> usize {
            self.vertices.len() / 3
        }

        fn num_vertices_of_face(&self, _face: usize) -> usize {
            3
        }

        fn position(&self, face: usize, vert: usize) -> [f32; 3] {
            self.vertices[face * 3 + vert].position
        }

        fn normal(&self, face: usize, vert: usize) -> [f32; 3] {
            self.vertices[face * 3 + vert].normal
        }

        fn tex_coord(&self, face: usize, vert: usize) -> [f32; 2] {
            self.vertices[face * 3 + vert].texcoord
        }

        fn set_tangent_encoded(&mut self, tangent: [f32; 4], face: usize, vert: usize) {
            self.vertices[face * 3 + vert].tangent = tangent;
        }
    }

    let mut geometry = TriangleList { vertices };
    if !generate_tangents(&mut geometry) {
        return Err(AssetError::malformed("mikktspace failed to generate tangents"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_quad_gets_u_aligned_tangents() {
        let corner = |position: [f32; 3], texcoord: [f32; 2]| Vertex {
            position,
            normal: [0.0, 0.0, 1.0],
            texcoord,
            tangent: [0.0; 4],
            ..Default::default()
        };
        let mut vertices = vec![
            corner([0.0, 0.0, 0.0], [0.0, 0.0]),
            corner([1.0, 0.0, 0.0], [1.0, 0.0]),
            corner([1.0, 1.0, 0.0], [1.0, 1.0]),
            corner([0.0, 0.0, 0.0], [0.0, 0.0]),
            corner([1.0, 1.0, 0.0], [1.0, 1.0]),
            corner([0.0, 1.0, 0.0], [0.0, 1.0]),
        ];
        generate_tangents_for_triangles(&mut vertices).unwrap();
        for vertex in &vertices {
            assert!((vertex.tangent[0] - 1.0).abs() < 1e-4, "{:?}", vertex.tangent);
            assert!(vertex.tangent[1].abs() < 1e-4);
            assert!(vertex.tangent[2].abs() < 1e-4);
        }
    }

    #[test]
    fn partial_triangle_is_rejected() {
        let mut vertices = vec![Vertex::default(); 4];
        assert!(generate_tangents_for_triangles(&mut vertices).is_err());
    }
}
