//! PointCloud - transport payload of every input and output stream
//!
//! Clouds are flat little-endian `f32` records described by named fields.
//! The synchronizer works on the packed `x, y, z, intensity` layout
//! ([`PointXYZI`]); [`PointCloud::to_xyzi`] normalises anything else.

use bytemuck::{Pod, Zeroable};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::ContractError;

/// Byte stride of the packed XYZI layout.
pub const XYZI_STRIDE: u32 = 16;

/// Message header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudHeader {
    /// Capture time (seconds)
    pub stamp: f64,

    /// Coordinate frame the points are expressed in
    pub frame_id: String,
}

/// One named `f32` field inside a point record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointField {
    pub name: String,

    /// Byte offset inside the point record
    pub offset: u32,
}

impl PointField {
    pub fn new(name: impl Into<String>, offset: u32) -> Self {
        Self {
            name: name.into(),
            offset,
        }
    }
}

/// Packed point record used by the synchronizer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct PointXYZI {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: f32,
}

/// Point cloud message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    pub header: CloudHeader,

    /// Number of points
    pub num_points: u32,

    /// Bytes per point
    pub point_stride: u32,

    /// Field layout of one point record
    pub fields: Vec<PointField>,

    /// Raw point records (zero-copy)
    pub data: Bytes,
}

impl PointCloud {
    /// Build a packed XYZI cloud from points.
    pub fn from_points(stamp: f64, frame_id: impl Into<String>, points: &[PointXYZI]) -> Self {
        Self {
            header: CloudHeader {
                stamp,
                frame_id: frame_id.into(),
            },
            num_points: points.len() as u32,
            point_stride: XYZI_STRIDE,
            fields: xyzi_fields(),
            data: Bytes::copy_from_slice(bytemuck::cast_slice(points)),
        }
    }

    /// Capture time shortcut
    #[inline]
    pub fn stamp(&self) -> f64 {
        self.header.stamp
    }

    /// Frame id shortcut
    #[inline]
    pub fn frame_id(&self) -> &str {
        &self.header.frame_id
    }

    /// Whether the cloud already uses the packed XYZI layout.
    pub fn is_xyzi(&self) -> bool {
        self.point_stride == XYZI_STRIDE && self.fields == xyzi_fields()
    }

    /// Decode the points of a packed XYZI cloud.
    ///
    /// The payload may not be 4-byte aligned, so records are copied out.
    pub fn points(&self) -> Result<Vec<PointXYZI>, ContractError> {
        if !self.is_xyzi() {
            return Err(ContractError::malformed_cloud(
                self.frame_id(),
                "cloud is not in packed xyzi layout",
            ));
        }
        let len = self.check_len()?;
        Ok(bytemuck::pod_collect_to_vec::<u8, PointXYZI>(&self.data[..len]))
    }

    /// Convert to the packed XYZI layout.
    ///
    /// A missing `intensity` field becomes `0.0`; missing coordinates or a
    /// short buffer are [`ContractError::MalformedCloud`].
    pub fn to_xyzi(&self) -> Result<PointCloud, ContractError> {
        if self.is_xyzi() {
            self.check_len()?;
            return Ok(self.clone());
        }
        self.check_len()?;

        let x = self.require_field("x")?;
        let y = self.require_field("y")?;
        let z = self.require_field("z")?;
        let intensity = match self.field_offset("intensity") {
            Some(_) => Some(self.require_field("intensity")?),
            None => None,
        };

        let stride = self.point_stride as usize;
        let points = self
            .data
            .chunks_exact(stride)
            .take(self.num_points as usize)
            .map(|record| {
                Some(PointXYZI {
                    x: read_f32(record, x)?,
                    y: read_f32(record, y)?,
                    z: read_f32(record, z)?,
                    intensity: match intensity {
                        Some(o) => read_f32(record, o)?,
                        None => 0.0,
                    },
                })
            })
            .collect::<Option<Vec<PointXYZI>>>()
            .ok_or_else(|| {
                ContractError::malformed_cloud(self.frame_id(), "point record shorter than stride")
            })?;

        Ok(PointCloud::from_points(
            self.header.stamp,
            self.header.frame_id.clone(),
            &points,
        ))
    }

    fn field_offset(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.offset as usize)
    }

    fn require_field(&self, name: &str) -> Result<usize, ContractError> {
        let offset = self.field_offset(name).ok_or_else(|| {
            ContractError::malformed_cloud(self.frame_id(), format!("missing field '{name}'"))
        })?;
        if offset.saturating_add(4) > self.point_stride as usize {
            return Err(ContractError::malformed_cloud(
                self.frame_id(),
                format!("field '{name}' at offset {offset} exceeds stride {}", self.point_stride),
            ));
        }
        Ok(offset)
    }

    /// Returns the number of payload bytes covered by `num_points`.
    fn check_len(&self) -> Result<usize, ContractError> {
        let expected = self.num_points as usize * self.point_stride as usize;
        if self.point_stride == 0 || self.data.len() < expected {
            return Err(ContractError::malformed_cloud(
                self.frame_id(),
                format!(
                    "payload has {} bytes, {} points of stride {} need {}",
                    self.data.len(),
                    self.num_points,
                    self.point_stride,
                    expected
                ),
            ));
        }
        Ok(expected)
    }
}

/// Field layout of [`PointXYZI`]
pub fn xyzi_fields() -> Vec<PointField> {
    vec![
        PointField::new("x", 0),
        PointField::new("y", 4),
        PointField::new("z", 8),
        PointField::new("intensity", 12),
    ]
}

#[inline]
fn read_f32(record: &[u8], offset: usize) -> Option<f32> {
    let raw: [u8; 4] = record.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
    Some(f32::from_le_bytes(raw))
}
