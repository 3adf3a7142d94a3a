use std::fmt;

use half::f16;

use crate::storage::CpuStorage;

/// Supported element types for matrix storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit floating point.
    F32,
    /// 16-bit floating point (IEEE 754 half-precision, via the `half` crate).
    F16,
}

impl DType {
    /// Returns the size in bytes of a single element.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
        }
    }

    /// Selects the load dtype from the half-precision switch.
    pub fn from_half_flag(half: bool) -> DType {
        if half {
            DType::F16
        } else {
            DType::F32
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "float32"),
            DType::F16 => write!(f, "float16"),
        }
    }
}

/// A scalar that can live in `CpuStorage`.
///
/// Kernels are written once against this trait and accumulate in f32
/// regardless of the storage width.
pub trait Element: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    const DTYPE: DType;

    fn to_f32(self) -> f32;

    fn from_f32(v: f32) -> Self;

    /// Move a buffer of this element type into storage.
    fn wrap(data: Vec<Self>) -> CpuStorage;

    /// Borrow the storage buffer if it holds this element type.
    fn view(storage: &CpuStorage) -> Option<&[Self]>;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }

    fn wrap(data: Vec<Self>) -> CpuStorage {
        CpuStorage::F32(data)
    }

    fn view(storage: &CpuStorage) -> Option<&[Self]> {
        match storage {
            CpuStorage::F32(v) => Some(v),
            _ => None,
        }
    }
}

impl Element for f16 {
    const DTYPE: DType = DType::F16;

    #[inline]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        f16::from_f32(v)
    }

    fn wrap(data: Vec<Self>) -> CpuStorage {
        CpuStorage::F16(data)
    }

    fn view(storage: &CpuStorage) -> Option<&[Self]> {
        match storage {
            CpuStorage::F16(v) => Some(v),
            _ => None,
        }
    }
}
