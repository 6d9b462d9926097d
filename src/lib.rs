//! # DICOM-mesh library
//!
//! This crate turns a CT series into a triangle mesh ready for rendering.
//!
//! A directory of DICOM slices is decoded into an 8-bit volume, samples
//! below a noise threshold are zeroed, and the isosurface at a chosen raw
//! intensity is extracted with marching cubes. The resulting mesh carries
//! per-vertex normals and texture coordinates that window each vertex's
//! intensity onto a color ramp, plus the series' rescale pair.
//!
//! The stages are exposed individually:
//!  - [`VolumeLoader`] decodes and orders the slices and reads the rescale
//!    pair
//!  - [`Volume::suppress_noise`] zeroes sub-threshold samples in place
//!  - [`MarchingCubes`] extracts the surface, in parallel over layers of cells
//!    using rayon
//!  - [`NormalEstimator`] and [`ColorMapper`] fill normals and UVs
//!
//! [`reconstruct`] runs all of them with one [`ReconstructionConfig`].
//!
//! DICOM files are assumed to have the following attributes:
//!   - Single-sample monochrome images (always the first frame is used)
//!   - Images from the same series, sharing rows and columns
//!   - Image Position (Patient) on every slice, unless another [`SortBy`]
//!     key is chosen
//!
//! Mesh vertices are in voxel index space: `[x, y, z]` where x runs along
//! columns, y along rows and z along the stack.
//!
//! # Examples
//!
//! ## Reconstructing a series
//!
//! Read all slices from the dicom/ directory and extract the surface at raw
//! intensity 204, after zeroing everything below 225.
//!
//! ```no_run
//! # use dicom_mesh::{reconstruct, ReconstructionConfig};
//! let config = ReconstructionConfig {
//!     isovalue: 204,
//!     noise_threshold: 225,
//!     recenter: true,
//!     ..Default::default()
//! };
//! let result = reconstruct("dicom", &config).expect("should have reconstructed the series");
//! let mesh = result.mesh;
//! println!("{} triangles", mesh.triangle_count());
//! let _vertices: &[u8] = mesh.vertex_bytes();
//! ```
//!
//! ## Running the stages by hand
//!
//! ```no_run
//! # use dicom_mesh::{ColorMapper, MarchingCubes, SortBy, VolumeLoader};
//! let mut series = VolumeLoader::load_from_directory("dicom", SortBy::ImagePositionPatient)
//!     .expect("should have loaded files from directory");
//! series.volume.suppress_noise(100);
//! let mut mesh = MarchingCubes::new(128).extract(&series.volume, &series.calibration);
//! mesh.compute_normals();
//! mesh.compute_uvs(&ColorMapper::new(&series.calibration, 100));
//! ```

pub mod calibration;
pub mod color_map;
pub mod enums;
mod interpolator;
pub mod marching_cubes;
pub mod mesh;
pub mod normals;
pub mod pipeline;
mod tables;
pub mod volume;
pub mod volume_loader;

pub use calibration::CalibrationParams;
pub use color_map::ColorMapper;
pub use enums::{Execution, SortBy, VertexWelding};
pub use marching_cubes::MarchingCubes;
pub use mesh::{Mesh, MeshError};
pub use normals::NormalEstimator;
pub use pipeline::{Reconstruction, ReconstructionConfig, reconstruct, reconstruct_volume};
pub use volume::Volume;
pub use volume_loader::{DecodedSeries, SliceError, VolumeLoader, VolumeLoaderError};
