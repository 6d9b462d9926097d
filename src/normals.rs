use nalgebra::Vector3;

use crate::mesh::Mesh;

pub struct NormalEstimator;

impl NormalEstimator {
    /// Area-weighted smooth normal per vertex.
    ///
    /// Each vertex gets the normalized sum of the unnormalized face normals
    /// `(b - a) x (c - a)` of its incident triangles. Vertices whose sum is
    /// zero (no incident triangles, or only degenerate ones) get the zero
    /// vector.
    pub fn vertex_normals(vertices: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
        let mut sums = vec![Vector3::<f64>::zeros(); vertices.len()];
        for tri in indices.chunks_exact(3) {
            let n = Self::face_cross(vertices, [tri[0], tri[1], tri[2]]);
            for &i in tri {
                sums[i as usize] += n;
            }
        }
        sums.iter().map(Self::unit_or_zero).collect()
    }

    /// Unit normal per triangle, for flat shading
    pub fn face_normals(vertices: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
        indices
            .chunks_exact(3)
            .map(|tri| Self::unit_or_zero(&Self::face_cross(vertices, [tri[0], tri[1], tri[2]])))
            .collect()
    }

    fn face_cross(vertices: &[[f32; 3]], [a, b, c]: [u32; 3]) -> Vector3<f64> {
        let p = |i: u32| Vector3::from(vertices[i as usize]).cast::<f64>();
        let (a, b, c) = (p(a), p(b), p(c));
        (b - a).cross(&(c - a))
    }

    fn unit_or_zero(n: &Vector3<f64>) -> [f32; 3] {
        let norm = n.norm();
        if norm > 0.0 {
            (n / norm).cast::<f32>().into()
        } else {
            [0.0; 3]
        }
    }
}

impl Mesh {
    /// Fills `normals` from the current vertices and triangles
    pub fn compute_normals(&mut self) {
        self.normals = NormalEstimator::vertex_normals(&self.vertices, &self.indices);
    }

    pub fn face_normals(&self) -> Vec<[f32; 3]> {
        NormalEstimator::face_normals(&self.vertices, &self.indices)
    }
}
