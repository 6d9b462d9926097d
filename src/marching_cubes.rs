use std::collections::HashMap;

use log::{debug, trace};
use rayon::prelude::*;

use crate::{
    calibration::CalibrationParams,
    enums::{Execution, VertexWelding},
    interpolator::Interpolator,
    mesh::Mesh,
    tables::{self, CORNER_OFFSETS, EDGE_CORNERS, EDGE_TABLE},
    volume::Volume,
};

/// Canonical id of a grid edge: linear index of its lower corner, times 3,
/// plus its axis
type EdgeKey = u64;

/// Isosurface extraction over every unit cell of a [`Volume`].
///
/// Corners at or above the isovalue are inside. Output vertices are in grid
/// index space (`[x, y, z]`, one unit per voxel) and triangles are wound
/// counter-clockwise when seen from the low-intensity side.
#[derive(Clone, Copy, Debug)]
pub struct MarchingCubes {
    isovalue: u8,
    welding: VertexWelding,
    execution: Execution,
}

/// Output of one layer of cells (fixed z), with layer-local indices
#[derive(Default)]
struct Layer {
    vertices: Vec<[f32; 3]>,
    colors: Vec<i32>,
    indices: Vec<u32>,
    /// Edge key per vertex and whether the edge lies on the layer's top
    /// plane, where the next layer can share it. Empty for `PerCell`.
    keys: Vec<(EdgeKey, bool)>,
}

impl Layer {
    fn push_vertex(&mut self, position: [f32; 3], color: i32) -> u32 {
        self.vertices.push(position);
        self.colors.push(color);
        (self.vertices.len() - 1) as u32
    }
}

impl MarchingCubes {
    pub fn new(isovalue: u8) -> Self {
        Self {
            isovalue,
            welding: VertexWelding::default(),
            execution: Execution::default(),
        }
    }

    pub fn with_welding(mut self, welding: VertexWelding) -> Self {
        self.welding = welding;
        self
    }

    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    pub fn isovalue(&self) -> u8 {
        self.isovalue
    }

    /// Extracts the isosurface.
    ///
    /// Each vertex carries the higher-intensity corner of its edge, mapped
    /// through [`CalibrationParams::display_value`], in `Mesh::colors`.
    /// Normals and UVs are left empty. An isovalue outside the volume's
    /// intensity range gives an empty mesh.
    pub fn extract(&self, volume: &Volume, calibration: &CalibrationParams) -> Mesh {
        let (dim_z, dim_y, dim_x) = volume.dim();
        if dim_x < 2 || dim_y < 2 || dim_z < 2 {
            return Mesh::default();
        }

        let cells_z = dim_z - 1;
        let layers: Vec<Layer> = match self.execution {
            Execution::Parallel => (0..cells_z)
                .into_par_iter()
                .map(|z| self.march_layer(volume, calibration, z))
                .collect(),
            Execution::Serial => (0..cells_z)
                .map(|z| self.march_layer(volume, calibration, z))
                .collect(),
        };

        let mesh = self.merge(layers);
        debug!(
            "marching cubes at {} over {dim_x}x{dim_y}x{dim_z}: {} vertices, {} triangles",
            self.isovalue,
            mesh.vertex_count(),
            mesh.triangle_count()
        );
        mesh
    }

    fn case_index(&self, corners: &[u8; 8]) -> u8 {
        corners
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v >= self.isovalue)
            .fold(0, |case, (i, _)| case | (1 << i))
    }

    fn march_layer(&self, volume: &Volume, calibration: &CalibrationParams, z: usize) -> Layer {
        let (_, dim_y, dim_x) = volume.dim();
        let mut layer = Layer::default();
        let mut welded: HashMap<EdgeKey, u32> = HashMap::new();

        for y in 0..dim_y - 1 {
            for x in 0..dim_x - 1 {
                let corners: [u8; 8] = std::array::from_fn(|i| {
                    let [dx, dy, dz] = CORNER_OFFSETS[i];
                    volume.get(x + dx, y + dy, z + dz)
                });
                let case = self.case_index(&corners);
                let crossed = EDGE_TABLE[case as usize];
                if crossed == 0 {
                    continue;
                }

                let origin = [x, y, z];
                let mut cell_vertices = [0u32; 12];
                for edge in (0..12).filter(|e| crossed & (1 << e) != 0) {
                    cell_vertices[edge] = match self.welding {
                        VertexWelding::Shared => {
                            let (key, on_top) = edge_key(dim_x, dim_y, origin, edge);
                            *welded.entry(key).or_insert_with(|| {
                                let (position, color) =
                                    self.crossing(&corners, origin, edge, calibration);
                                layer.keys.push((key, on_top));
                                layer.push_vertex(position, color)
                            })
                        }
                        VertexWelding::PerCell => {
                            let (position, color) =
                                self.crossing(&corners, origin, edge, calibration);
                            layer.push_vertex(position, color)
                        }
                    };
                }

                for tri in tables::triangles(case) {
                    layer.indices.extend(tri.map(|e| cell_vertices[e]));
                }
            }
        }

        trace!(
            "layer {z}: {} vertices, {} triangles",
            layer.vertices.len(),
            layer.indices.len() / 3
        );
        layer
    }

    /// Position and color of the surface crossing on one edge of a cell
    fn crossing(
        &self,
        corners: &[u8; 8],
        origin: [usize; 3],
        edge: usize,
        calibration: &CalibrationParams,
    ) -> ([f32; 3], i32) {
        let [a, b] = EDGE_CORNERS[edge];
        let (low, high) = if corners[a] <= corners[b] { (a, b) } else { (b, a) };
        let t = Interpolator::edge_fraction(self.isovalue, corners[low], corners[high]);
        let corner_position = |c: usize| -> [f32; 3] {
            let offset = CORNER_OFFSETS[c];
            std::array::from_fn(|i| (origin[i] + offset[i]) as f32)
        };
        let position = Interpolator::lerp(corner_position(low), corner_position(high), t);
        (position, calibration.display_value(corners[high]))
    }

    /// Concatenates layers in z order, rebasing indices. With shared welding,
    /// vertices on the plane between two layers are emitted once.
    fn merge(&self, layers: Vec<Layer>) -> Mesh {
        let mut mesh = Mesh::default();
        mesh.vertices
            .reserve(layers.iter().map(|l| l.vertices.len()).sum());
        mesh.indices
            .reserve(layers.iter().map(|l| l.indices.len()).sum());

        let mut seam: HashMap<EdgeKey, u32> = HashMap::new();
        for layer in layers {
            let remap: Vec<u32> = match self.welding {
                VertexWelding::Shared => {
                    let mut next_seam = HashMap::new();
                    let remap = layer
                        .keys
                        .iter()
                        .enumerate()
                        .map(|(local, &(key, on_top))| {
                            let index = match seam.get(&key) {
                                Some(&index) => index,
                                None => {
                                    mesh.vertices.push(layer.vertices[local]);
                                    mesh.colors.push(layer.colors[local]);
                                    (mesh.vertices.len() - 1) as u32
                                }
                            };
                            if on_top {
                                next_seam.insert(key, index);
                            }
                            index
                        })
                        .collect();
                    seam = next_seam;
                    remap
                }
                VertexWelding::PerCell => {
                    let base = mesh.vertices.len() as u32;
                    mesh.vertices.extend_from_slice(&layer.vertices);
                    mesh.colors.extend_from_slice(&layer.colors);
                    (base..base + layer.vertices.len() as u32).collect()
                }
            };
            mesh.indices
                .extend(layer.indices.iter().map(|&i| remap[i as usize]));
        }
        mesh
    }
}

/// Canonical key of a cell edge, and whether the edge lies in the cell's
/// top (`z + 1`) plane
fn edge_key(dim_x: usize, dim_y: usize, origin: [usize; 3], edge: usize) -> (EdgeKey, bool) {
    let [a, b] = EDGE_CORNERS[edge];
    let (oa, ob) = (CORNER_OFFSETS[a], CORNER_OFFSETS[b]);
    let lower: [usize; 3] = std::array::from_fn(|i| origin[i] + oa[i].min(ob[i]));
    let axis = (0..3).position(|i| oa[i] != ob[i]).unwrap_or(0);
    let linear = (lower[2] * dim_y + lower[1]) * dim_x + lower[0];
    let on_top = axis != 2 && lower[2] == origin[2] + 1;
    (linear as EdgeKey * 3 + axis as EdgeKey, on_top)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn sphere(n: usize, center: f32, radius: f32) -> Volume {
        Volume::from_fn((n, n, n), |x, y, z| {
            let d = Vector3::new(x as f32, y as f32, z as f32) - Vector3::repeat(center);
            if d.norm() <= radius { 200 } else { 0 }
        })
    }

    fn signed_volume(mesh: &Mesh) -> f32 {
        mesh.triangles()
            .map(|[a, b, c]| {
                let p = |i: u32| Vector3::from(mesh.vertices[i as usize]);
                p(a).dot(&p(b).cross(&p(c))) / 6.0
            })
            .sum()
    }

    fn assert_watertight(mesh: &Mesh) {
        let mut directed: HashMap<(u32, u32), usize> = HashMap::new();
        for [a, b, c] in mesh.triangles() {
            for edge in [(a, b), (b, c), (c, a)] {
                *directed.entry(edge).or_default() += 1;
            }
        }
        for (&(a, b), &count) in &directed {
            assert_eq!(count, 1, "edge {a}->{b} used {count} times");
            assert_eq!(directed.get(&(b, a)), Some(&1), "edge {a}-{b} is open");
        }
    }

    #[test]
    fn uniform_volumes_are_empty() {
        let low = Volume::from_fn((4, 4, 4), |_, _, _| 10);
        let high = Volume::from_fn((4, 4, 4), |_, _, _| 250);
        for execution in [Execution::Serial, Execution::Parallel] {
            let mc = MarchingCubes::new(128).with_execution(execution);
            assert!(mc.extract(&low, &CalibrationParams::NONE).is_empty());
            assert!(mc.extract(&high, &CalibrationParams::NONE).is_empty());
        }
    }

    #[test]
    fn isovalue_outside_range_is_empty() {
        let v = sphere(6, 2.5, 2.0);
        let mut masked = v.clone();
        masked.data.mapv_inplace(|s| s.max(20));
        let mesh = MarchingCubes::new(10).extract(&masked, &CalibrationParams::NONE);
        assert_eq!(mesh.vertex_count(), 0);
        assert_eq!(mesh.indices.len(), 0);
        let mesh = MarchingCubes::new(201).extract(&v, &CalibrationParams::NONE);
        assert!(mesh.is_empty());
    }

    #[test]
    fn flat_volume_has_no_cells() {
        let v = Volume::from_fn((4, 4, 1), |x, _, _| if x > 1 { 255 } else { 0 });
        assert!(MarchingCubes::new(128).extract(&v, &CalibrationParams::NONE).is_empty());
    }

    #[test]
    fn single_corner_cell() {
        let v = Volume::from_fn((2, 2, 2), |x, y, z| if x + y + z == 0 { 200 } else { 0 });
        let mesh = MarchingCubes::new(100).extract(&v, &CalibrationParams::NONE);
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.colors, vec![200; 3]);
        for p in &mesh.vertices {
            assert_relative_eq!(p.iter().sum::<f32>(), 0.5);
        }
        // Faces away from the bright corner
        let n = mesh.face_normals()[0];
        assert!(n.iter().all(|&c| c > 0.0));
    }

    #[test]
    fn colors_are_display_calibrated() {
        let v = Volume::from_fn((2, 2, 2), |x, y, z| if x + y + z == 0 { 200 } else { 0 });
        let mesh = MarchingCubes::new(100).extract(&v, &CalibrationParams::new(-1024, 1));
        assert_eq!(mesh.colors, vec![136; 3]);
    }

    #[test]
    fn sphere_is_closed_and_outward() {
        let v = sphere(4, 1.5, 1.5);
        let mesh = MarchingCubes::new(100).extract(&v, &CalibrationParams::NONE);
        assert_eq!(mesh.validate(), Ok(()));
        assert!(!mesh.is_empty());
        assert_eq!(mesh.indices.len() % 3, 0);
        assert_watertight(&mesh);
        assert!(signed_volume(&mesh) > 0.0);
    }

    #[test]
    fn larger_sphere_is_closed() {
        let v = sphere(12, 5.5, 4.2);
        let mesh = MarchingCubes::new(100).extract(&v, &CalibrationParams::NONE);
        assert_watertight(&mesh);
        // Every vertex lies on the half-way point of a grid edge
        for p in &mesh.vertices {
            let halves = p.iter().filter(|c| c.fract() == 0.5).count();
            assert_eq!(halves, 1, "{p:?}");
        }
        assert!(signed_volume(&mesh) > 0.0);
    }

    #[test]
    fn per_cell_welding_duplicates_shared_vertices() {
        let v = sphere(8, 3.5, 2.6);
        let shared = MarchingCubes::new(100).extract(&v, &CalibrationParams::NONE);
        let per_cell = MarchingCubes::new(100)
            .with_welding(VertexWelding::PerCell)
            .extract(&v, &CalibrationParams::NONE);
        assert_eq!(per_cell.validate(), Ok(()));
        assert_eq!(shared.triangle_count(), per_cell.triangle_count());
        assert!(per_cell.vertex_count() > shared.vertex_count());

        let corners = |m: &Mesh| -> Vec<[f32; 3]> {
            m.indices.iter().map(|&i| m.vertices[i as usize]).collect()
        };
        assert_eq!(corners(&shared), corners(&per_cell));
    }

    #[test]
    fn per_cell_triangles_share_their_cell_vertices() {
        // Corners 0 and 1 inside: four crossed edges, two triangles
        let v = Volume::from_fn((2, 2, 2), |_, y, z| if y + z == 0 { 200 } else { 0 });
        let mesh = MarchingCubes::new(100)
            .with_welding(VertexWelding::PerCell)
            .extract(&v, &CalibrationParams::NONE);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.validate(), Ok(()));
    }

    #[test]
    fn parallel_matches_serial() {
        let v = Volume::from_fn((9, 7, 8), |x, y, z| ((x * 53 + y * 97 + z * 31) % 256) as u8);
        for welding in [VertexWelding::Shared, VertexWelding::PerCell] {
            let mc = MarchingCubes::new(120).with_welding(welding);
            let serial = mc
                .with_execution(Execution::Serial)
                .extract(&v, &CalibrationParams::NONE);
            let parallel = mc
                .with_execution(Execution::Parallel)
                .extract(&v, &CalibrationParams::NONE);
            assert_eq!(serial, parallel);
            assert_eq!(serial.validate(), Ok(()));
        }
    }

    #[test]
    fn shared_vertices_are_unique_per_edge() {
        let v = sphere(10, 4.5, 3.3);
        let mesh = MarchingCubes::new(100).extract(&v, &CalibrationParams::NONE);
        let mut seen = std::collections::HashSet::new();
        for p in &mesh.vertices {
            assert!(seen.insert(p.map(f32::to_bits)), "duplicate vertex {p:?}");
        }
    }

    #[test]
    fn edge_keys_agree_between_neighbours() {
        // Edge 5 (corners 5-6) of cell (0, 0, 0) is edge 7 (corners 7-4) of
        // cell (1, 0, 0)
        assert_eq!(edge_key(4, 4, [0, 0, 0], 5), edge_key(4, 4, [1, 0, 0], 7));
        // Edge 4 of layer z is edge 0 of layer z + 1
        let (top, on_top) = edge_key(4, 4, [1, 1, 0], 4);
        let (bottom, on_bottom_top) = edge_key(4, 4, [1, 1, 1], 0);
        assert_eq!(top, bottom);
        assert!(on_top);
        assert!(!on_bottom_top);
    }
}
