use std::path::Path;

use log::debug;

use crate::{
    calibration::CalibrationParams,
    color_map::ColorMapper,
    enums::{Execution, SortBy, VertexWelding},
    marching_cubes::MarchingCubes,
    mesh::Mesh,
    volume::Volume,
    volume_loader::{DecodedSeries, VolumeLoader, VolumeLoaderError},
};

/// Everything one reconstruction run needs besides the input series
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconstructionConfig {
    /// Raw intensity the surface is extracted at
    pub isovalue: u8,
    /// Raw intensities below this are zeroed before extraction; also the
    /// lower edge of the color window
    pub noise_threshold: u8,
    pub sort_by: SortBy,
    pub welding: VertexWelding,
    pub execution: Execution,
    /// Move the mesh so its vertex centroid is at the origin
    pub recenter: bool,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            isovalue: 204,
            noise_threshold: 225,
            sort_by: SortBy::default(),
            welding: VertexWelding::default(),
            execution: Execution::default(),
            recenter: false,
        }
    }
}

/// Buffers handed to the renderer
#[derive(Clone, Debug, PartialEq)]
pub struct Reconstruction {
    pub mesh: Mesh,
    pub calibration: CalibrationParams,
    /// Centroid subtracted from every vertex, when recentering was requested
    pub pivot: Option<[f32; 3]>,
}

/// Decodes the series in `path` and turns it into a shaded mesh
pub fn reconstruct(
    path: impl AsRef<Path>,
    config: &ReconstructionConfig,
) -> Result<Reconstruction, VolumeLoaderError> {
    let DecodedSeries {
        volume,
        calibration,
    } = VolumeLoader::load_from_directory(path, config.sort_by)?;
    Ok(reconstruct_volume(volume, calibration, config))
}

/// Runs noise suppression, marching cubes, normals and color mapping on an
/// already decoded volume
pub fn reconstruct_volume(
    mut volume: Volume,
    calibration: CalibrationParams,
    config: &ReconstructionConfig,
) -> Reconstruction {
    volume.suppress_noise(config.noise_threshold);

    let mut mesh = MarchingCubes::new(config.isovalue)
        .with_welding(config.welding)
        .with_execution(config.execution)
        .extract(&volume, &calibration);
    drop(volume);

    let pivot = config.recenter.then(|| mesh.center_on_centroid());
    mesh.compute_normals();
    mesh.compute_uvs(&ColorMapper::new(&calibration, config.noise_threshold));

    debug_assert_eq!(mesh.validate(), Ok(()));
    debug!(
        "reconstruction done: {} vertices, {} triangles",
        mesh.vertex_count(),
        mesh.triangle_count()
    );
    Reconstruction {
        mesh,
        calibration,
        pivot,
    }
}
