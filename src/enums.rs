/// Metadata used to order slices along the stacking axis
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortBy {
    /// Image Position (Patient), projected onto the slice normal when
    /// Image Orientation (Patient) is present
    #[default]
    ImagePositionPatient,
    SliceLocation,
    InstanceNumber,
}

/// How marching cubes turns edge crossings into vertices
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VertexWelding {
    /// One vertex per crossed grid edge, shared by every cell touching it
    #[default]
    Shared,
    /// A fresh vertex per crossed edge of each cell, shared only by that
    /// cell's triangles
    PerCell,
}

/// How the cell walk is scheduled
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Execution {
    /// One rayon task per layer of cells
    #[default]
    Parallel,
    Serial,
}
