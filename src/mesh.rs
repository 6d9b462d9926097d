use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeshError {
    #[error("Index buffer length {0} is not a multiple of 3")]
    RaggedIndices(usize),

    #[error("Index {index} out of range for {vertices} vertices")]
    IndexOutOfRange { index: u32, vertices: usize },

    #[error("{attribute} has {len} entries for {vertices} vertices")]
    AttributeLength {
        attribute: &'static str,
        len: usize,
        vertices: usize,
    },
}

/// Indexed triangle mesh with per-vertex attributes.
///
/// Marching cubes fills `vertices`, `indices` and `colors`;
/// [`Mesh::compute_normals`] and [`Mesh::compute_uvs`] fill the rest.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<[f32; 3]>,
    /// Counter-clockwise triangles, three indices each
    pub indices: Vec<u32>,
    /// Display-calibrated intensity sampled at each vertex
    pub colors: Vec<i32>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
}

impl Mesh {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    /// Checks the index buffer and that every attribute is parallel to
    /// `vertices`. Normals and UVs may be absent (empty) before enrichment.
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.indices.len() % 3 != 0 {
            return Err(MeshError::RaggedIndices(self.indices.len()));
        }
        let vertices = self.vertices.len();
        if let Some(&index) = self.indices.iter().find(|&&i| i as usize >= vertices) {
            return Err(MeshError::IndexOutOfRange { index, vertices });
        }
        let attributes = [
            ("colors", self.colors.len(), true),
            ("normals", self.normals.len(), !self.normals.is_empty()),
            ("uvs", self.uvs.len(), !self.uvs.is_empty()),
        ];
        for (attribute, len, required) in attributes {
            if required && len != vertices {
                return Err(MeshError::AttributeLength {
                    attribute,
                    len,
                    vertices,
                });
            }
        }
        Ok(())
    }

    /// Translates the mesh so the vertex centroid sits at the origin and
    /// returns the centroid it was moved from
    pub fn center_on_centroid(&mut self) -> [f32; 3] {
        if self.vertices.is_empty() {
            return [0.0; 3];
        }
        let n = self.vertices.len() as f64;
        let mut sum = [0.0f64; 3];
        for v in &self.vertices {
            for i in 0..3 {
                sum[i] += v[i] as f64;
            }
        }
        let pivot = sum.map(|s| (s / n) as f32);
        for v in &mut self.vertices {
            for i in 0..3 {
                v[i] -= pivot[i];
            }
        }
        pivot
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    pub fn normal_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.normals)
    }

    pub fn uv_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.uvs)
    }
}
