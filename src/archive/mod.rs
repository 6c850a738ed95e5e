//! Named arrays, corrected clips, and the writers that persist them.
//!
//! A [`Record`] is an ordered `key → array` mapping. Arrays are row-major
//! with time as the outermost axis and, for per-joint fields, joint next.

use std::path::Path;

use crate::clip::Clip;
use crate::math::{Quat, Vec3};
use crate::{Error, Result};

mod bvh;
mod write;

pub use bvh::{bvh_bytes, file_order, BvhWriter};
pub use write::{npy_bytes, npz_bytes, NpzWriter};

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    F32(Vec<f32>),
    I64(Vec<i64>),
    Str(Vec<String>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            ArrayData::F32(v) => v.len(),
            ArrayData::I64(v) => v.len(),
            ArrayData::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl NdArray {
    pub fn new(shape: Vec<usize>, data: ArrayData) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::ShapeMismatch(format!(
                "shape {:?} holds {} values, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn scalar(value: f32) -> Self {
        Self {
            shape: vec![],
            data: ArrayData::F32(vec![value]),
        }
    }

    pub fn strings(values: Vec<String>) -> Self {
        Self {
            shape: vec![values.len()],
            data: ArrayData::Str(values),
        }
    }

    pub fn integers(values: Vec<i64>) -> Self {
        Self {
            shape: vec![values.len()],
            data: ArrayData::I64(values),
        }
    }

    /// `(N, 3)`
    pub fn vectors(rows: &[Vec3]) -> Self {
        Self {
            shape: vec![rows.len(), 3],
            data: ArrayData::F32(rows.iter().flat_map(|v| vec3(*v)).collect()),
        }
    }

    /// `(N, 4)`, stored `x, y, z, w`.
    pub fn quaternions(rows: &[Quat]) -> Self {
        Self {
            shape: vec![rows.len(), 4],
            data: ArrayData::F32(rows.iter().flat_map(|q| quat(*q)).collect()),
        }
    }

    /// `(T, J, 3)`
    pub fn vector_grid(rows: &[Vec<Vec3>]) -> Result<Self> {
        grid(rows, 3, vec3)
    }

    /// `(T, J, 4)`, stored `x, y, z, w`.
    pub fn quaternion_grid(rows: &[Vec<Quat>]) -> Result<Self> {
        grid(rows, 4, quat)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }
}

fn vec3(v: Vec3) -> Vec<f32> {
    vec![v.x, v.y, v.z]
}

fn quat(q: Quat) -> Vec<f32> {
    vec![q.v.x, q.v.y, q.v.z, q.s]
}

fn grid<T: Copy>(rows: &[Vec<T>], width: usize, flat: fn(T) -> Vec<f32>) -> Result<NdArray> {
    let columns = rows.first().map(Vec::len).unwrap_or(0);
    if let Some(row) = rows.iter().position(|r| r.len() != columns) {
        return Err(Error::ShapeMismatch(format!(
            "row {} has {} entries, row 0 has {}",
            row,
            rows[row].len(),
            columns
        )));
    }
    let data = rows
        .iter()
        .flat_map(|r| r.iter().flat_map(|x| flat(*x)))
        .collect();
    NdArray::new(vec![rows.len(), columns, width], ArrayData::F32(data))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, NdArray)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `array` under `key`, replacing any array already stored there.
    pub fn insert<K: Into<String>>(&mut self, key: K, array: NdArray) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = array,
            None => self.entries.push((key, array)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&NdArray> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, a)| a)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| &k[..])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NdArray)> {
        self.entries.iter().map(|(k, a)| (&k[..], a))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Persists a record as one file.
pub trait ArchiveWriter {
    /// File extension for archives this writer produces, without the dot.
    fn extension(&self) -> &'static str;

    fn write(&self, record: &Record, path: &Path) -> Result<()>;
}

/// Persists a whole clip, skeleton and poses, as one motion file.
pub trait ClipWriter {
    fn extension(&self) -> &'static str;

    fn write(&self, clip: &Clip, path: &Path) -> Result<()>;
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::{axis_angle, Axis};
    use cgmath::Zero;

    #[test]
    fn shapes_are_checked() {
        assert!(NdArray::new(vec![2, 3], ArrayData::F32(vec![0.0; 6])).is_ok());
        assert!(matches!(
            NdArray::new(vec![2, 3], ArrayData::F32(vec![0.0; 5])),
            Err(Error::ShapeMismatch(_))
        ));
        let ragged = vec![vec![Vec3::zero(); 2], vec![Vec3::zero(); 3]];
        assert!(NdArray::vector_grid(&ragged).is_err());
    }

    #[test]
    fn quaternions_are_stored_scalar_last() {
        let q = axis_angle(Axis::Z, 90.0);
        let array = NdArray::quaternions(&[q]);
        assert_eq!(array.shape(), &[1, 4]);
        match array.data() {
            ArrayData::F32(v) => assert_eq!(v[..], [0.0, 0.0, q.v.z, q.s]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn grids_are_time_major() {
        let rows = vec![
            vec![Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0)],
            vec![Vec3::new(7.0, 8.0, 9.0), Vec3::new(10.0, 11.0, 12.0)],
        ];
        let array = NdArray::vector_grid(&rows).unwrap();
        assert_eq!(array.shape(), &[2, 2, 3]);
        match array.data() {
            ArrayData::F32(v) => assert_eq!(v[6..9], [7.0, 8.0, 9.0]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn record_keeps_insertion_order() {
        let mut record = Record::new();
        record.insert("b", NdArray::scalar(1.0));
        record.insert("a", NdArray::scalar(2.0));
        record.insert("b", NdArray::scalar(3.0));
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(record.get("b"), Some(&NdArray::scalar(3.0)));
        assert!(record.get("c").is_none());
    }
}
