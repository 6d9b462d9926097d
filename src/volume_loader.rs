use crate::{calibration::CalibrationParams, enums::SortBy, volume::Volume};

use dicom::{
    core::Tag,
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{
        ConvertOptions, ModalityLutOption, PixelDecoder, PixelRepresentation, VoiLutOption,
    },
};
use dicom_dictionary_std::tags;
use log::debug;
use nalgebra::Vector3;
use ndarray::{Array2, Array3, s};
use rayon::prelude::*;
use std::{
    fs::{self, File},
    io::Read,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No DICOM slices found")]
    EmptySeries,

    #[error("Failed to decode slice {slice}: {source}")]
    Decode {
        slice: String,
        #[source]
        source: SliceError,
    },

    #[error("Slice {slice} is {found:?} (rows, columns) but the series is {expected:?}")]
    DimensionMismatch {
        slice: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single slice could not be decoded
#[derive(Debug, Error)]
pub enum SliceError {
    #[error("{0}")]
    Read(#[from] dicom::object::ReadError),

    #[error("{0}")]
    PixelData(#[from] dicom::pixeldata::Error),

    #[error("Missing {0}")]
    MissingSortKey(&'static str),
}

/// A series decoded into one volume, with the rescale pair of its first slice
#[derive(Clone, Debug)]
pub struct DecodedSeries {
    pub volume: Volume,
    pub calibration: CalibrationParams,
}

struct Slice<'a> {
    label: &'a str,
    order: f64,
    image: Array2<u8>,
    /// Added to signed stored values to bring them onto the unsigned range
    offset: i32,
    object: &'a FileDicomObject<InMemDicomObject>,
}

/// Stored sample range of one slice
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct StoredRange {
    bits_stored: u16,
    signed: bool,
}

impl StoredRange {
    fn bits(&self) -> u16 {
        self.bits_stored.clamp(1, 16)
    }

    /// `2^(bits - 1)` for signed samples, zero otherwise
    fn offset(&self) -> i32 {
        if self.signed { 1 << (self.bits() - 1) } else { 0 }
    }

    fn max(&self) -> i32 {
        (1 << self.bits()) - 1
    }
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from DICOM objects
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects, in any order
    /// * `sort_by` - Metadata used to order the slices along the stack
    ///
    /// # Errors
    ///
    /// Returns error if there are no objects, any object fails to decode or
    /// lacks the sort key, or the in-plane dimensions are inconsistent
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<DecodedSeries, VolumeLoaderError> {
        let labeled: Vec<_> = dicom_objects
            .iter()
            .enumerate()
            .map(|(i, object)| (Self::object_label(object, i), object))
            .collect();
        Self::load_labeled(&labeled, sort_by)
    }

    /// Load a volume from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path> + Sync],
        sort_by: SortBy,
    ) -> Result<DecodedSeries, VolumeLoaderError> {
        let opened: Vec<_> = paths
            .par_iter()
            .map(|path| {
                let path = path.as_ref();
                let label = path.display().to_string();
                match open_file(path) {
                    Ok(object) => Ok((label, object)),
                    Err(e) => Err(VolumeLoaderError::Decode {
                        slice: label,
                        source: e.into(),
                    }),
                }
            })
            .collect();
        let objects = opened.into_iter().collect::<Result<Vec<_>, _>>()?;

        let labeled: Vec<_> = objects
            .iter()
            .map(|(label, object)| (label.clone(), object))
            .collect();
        Self::load_labeled(&labeled, sort_by)
    }

    /// Load a volume from a directory of slice files.
    ///
    /// Every file with a `.dcm` extension, or starting with the DICOM
    /// preamble and `DICM` prefix, is treated as a slice. Hidden files are
    /// skipped.
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<DecodedSeries, VolumeLoaderError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && Self::is_slice_file(path))
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::EmptySeries);
        }
        paths.sort();

        Self::load_from_file_paths(&paths, sort_by)
    }

    fn is_slice_file(path: &Path) -> bool {
        let hidden = path
            .file_name()
            .and_then(|s| s.to_str())
            .is_some_and(|name| name.starts_with('.'));
        if hidden {
            return false;
        }
        path.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            || Self::has_dicm_prefix(path)
    }

    /// Part 10 files carry a 128 byte preamble followed by `DICM`
    fn has_dicm_prefix(path: &Path) -> bool {
        let mut header = [0u8; 132];
        let read = File::open(path).and_then(|mut file| file.read_exact(&mut header));
        read.is_ok() && &header[128..] == b"DICM"
    }

    fn object_label(dicom_object: &FileDicomObject<InMemDicomObject>, index: usize) -> String {
        dicom_object
            .element(tags::SOP_INSTANCE_UID)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|uid| uid.trim_end_matches('\0').trim().to_string())
            .filter(|uid| !uid.is_empty())
            .unwrap_or_else(|| format!("#{index}"))
    }

    fn load_labeled(
        objects: &[(String, &FileDicomObject<InMemDicomObject>)],
        sort_by: SortBy,
    ) -> Result<DecodedSeries, VolumeLoaderError> {
        if objects.is_empty() {
            return Err(VolumeLoaderError::EmptySeries);
        }

        let decoded: Vec<_> = objects
            .par_iter()
            .map(|(label, object)| Self::decode_slice(label, object, sort_by))
            .collect();
        let mut slices = decoded.into_iter().collect::<Result<Vec<_>, _>>()?;

        Self::sort_slices(&mut slices);
        Self::validate_dimensions(&slices)?;

        let first = &slices[0];
        let calibration = Self::get_calibration(first.object, first.offset);
        let mut volume = Volume::new(Self::build_volume_array(&slices));
        if let Some(spacing) = Self::get_spacing(slices.iter().map(|s| s.object)) {
            volume = volume.with_spacing(spacing);
        }

        debug!(
            "decoded {} slices of {}x{}, calibration {:?}",
            slices.len(),
            volume.dim_x(),
            volume.dim_y(),
            calibration
        );
        Ok(DecodedSeries {
            volume,
            calibration,
        })
    }

    fn decode_slice<'a>(
        label: &'a str,
        dicom_object: &'a FileDicomObject<InMemDicomObject>,
        sort_by: SortBy,
    ) -> Result<Slice<'a>, VolumeLoaderError> {
        let decode = || -> Result<Slice<'a>, SliceError> {
            let order = Self::get_sort_order(dicom_object, sort_by)?;
            let (image, range) = Self::decode_image(dicom_object)?;
            Ok(Slice {
                label,
                order,
                image,
                offset: range.offset(),
                object: dicom_object,
            })
        };
        decode().map_err(|source| VolumeLoaderError::Decode {
            slice: label.to_string(),
            source,
        })
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: SortBy,
    ) -> Result<f64, SliceError> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                let pos = dicom_object
                    .element(tags::IMAGE_POSITION_PATIENT)
                    .ok()
                    .and_then(|e| e.to_multi_float64().ok())
                    .filter(|pos| pos.len() >= 3)
                    .ok_or(SliceError::MissingSortKey("Image Position (Patient)"))?;
                let normal = Self::get_slice_normal(dicom_object).unwrap_or_else(Vector3::z);
                Ok(Vector3::new(pos[0], pos[1], pos[2]).dot(&normal))
            }
            SortBy::SliceLocation => Self::read_f64(dicom_object, tags::SLICE_LOCATION)
                .ok_or(SliceError::MissingSortKey("Slice Location")),
            SortBy::InstanceNumber => dicom_object
                .element(tags::INSTANCE_NUMBER)
                .ok()
                .and_then(|e| e.to_int::<i32>().ok())
                .map(f64::from)
                .ok_or(SliceError::MissingSortKey("Instance Number")),
        }
    }

    /// Unit normal of the slice plane from Image Orientation (Patient)
    fn get_slice_normal(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Vector3<f64>> {
        let cosines = dicom_object
            .element(tags::IMAGE_ORIENTATION_PATIENT)
            .ok()?
            .to_multi_float64()
            .ok()?;
        if cosines.len() < 6 {
            return None;
        }
        let row = Vector3::new(cosines[0], cosines[1], cosines[2]);
        let column = Vector3::new(cosines[3], cosines[4], cosines[5]);
        row.cross(&column).try_normalize(f64::EPSILON)
    }

    /// Decodes the first frame to 8 bits, scaling the stored range (from
    /// Bits Stored) onto 0..=255. Signed samples are shifted up by
    /// `2^(bits - 1)` first, so the most negative stored value maps to 0.
    /// No modality or VOI LUT is applied.
    fn decode_image(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<(Array2<u8>, StoredRange), SliceError> {
        let pixel_data = dicom_object.decode_pixel_data()?;
        let range = StoredRange {
            bits_stored: pixel_data.bits_stored(),
            signed: pixel_data.pixel_representation() == PixelRepresentation::Signed,
        };
        // 8-bit samples come out as raw bytes whatever their signedness
        let reinterpret_i8 = range.signed && pixel_data.bits_allocated() == 8;
        let options = ConvertOptions::new()
            .with_modality_lut(ModalityLutOption::None)
            .with_voi_lut(VoiLutOption::Identity);
        let frames = pixel_data.to_ndarray_with_options::<i32>(&options)?;
        let image = frames.slice_move(s![0, .., .., 0]).mapv(|v| {
            let v = if reinterpret_i8 { v as u8 as i8 as i32 } else { v };
            Self::normalize_to_u8(v, range)
        });
        Ok((image, range))
    }

    /// Out-of-range stored values are clamped
    #[inline]
    fn normalize_to_u8(value: i32, range: StoredRange) -> u8 {
        let shifted = (value + range.offset()).clamp(0, range.max());
        ((shifted as f32 / range.max() as f32) * 255.0).round() as u8
    }

    fn sort_slices(slices: &mut [Slice<'_>]) {
        slices.sort_by(|a, b| {
            a.order
                .total_cmp(&b.order)
                .then_with(|| a.label.cmp(b.label))
        });
    }

    fn validate_dimensions(slices: &[Slice<'_>]) -> Result<(), VolumeLoaderError> {
        let expected = slices[0].image.dim();
        match slices.iter().find(|slice| slice.image.dim() != expected) {
            Some(slice) => Err(VolumeLoaderError::DimensionMismatch {
                slice: slice.label.to_string(),
                expected,
                found: slice.image.dim(),
            }),
            None => Ok(()),
        }
    }

    fn build_volume_array(slices: &[Slice<'_>]) -> Array3<u8> {
        let (height, width) = slices[0].image.dim();
        let depth = slices.len();
        let mut volume = Array3::<u8>::zeros((depth, height, width));

        for (i, slice) in slices.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(&slice.image);
        }

        volume
    }

    fn read_f64(dicom_object: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<f64> {
        dicom_object.element(tag).ok()?.to_float64().ok()
    }

    /// Rescale pair, or [`CalibrationParams::NONE`] unless both tags are
    /// present. The intercept absorbs the signed sample `offset`, so
    /// calibrated values match the stored ones.
    fn get_calibration(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        offset: i32,
    ) -> CalibrationParams {
        let intercept = Self::read_f64(dicom_object, tags::RESCALE_INTERCEPT);
        let slope = Self::read_f64(dicom_object, tags::RESCALE_SLOPE);
        match (intercept, slope) {
            (Some(intercept), Some(slope)) => {
                let slope = slope.round().clamp(0.0, u16::MAX as f64) as u16;
                CalibrationParams::new(intercept.round() as i32 - offset * slope as i32, slope)
            }
            _ => CalibrationParams::NONE,
        }
    }

    fn get_spacing<'a>(
        mut dicom_objects: impl Iterator<Item = &'a FileDicomObject<InMemDicomObject>>,
    ) -> Option<(f32, f32, f32)> {
        dicom_objects.find_map(|dicom_object| {
            let pixel_spacing = dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float32()
                .ok()?;

            let slice_thickness = dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()?
                .to_float32()
                .ok()?;

            Some((*pixel_spacing.first()?, *pixel_spacing.get(1)?, slice_thickness))
        })
    }
}
