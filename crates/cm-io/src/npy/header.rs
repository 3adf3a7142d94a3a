use std::io::Read;

use cm_tensor::DType;

use crate::error::{Result, StoreError};

/// The six-byte magic string opening every `.npy` file.
pub const NPY_MAGIC: [u8; 6] = *b"\x93NUMPY";

/// Total preamble + header length is padded to a multiple of this.
pub const HEADER_ALIGNMENT: usize = 64;

/// Byte order of stored elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Floating-point element formats this crate can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatFormat {
    F16,
    F32,
    F64,
}

impl FloatFormat {
    pub fn item_size(&self) -> usize {
        match self {
            FloatFormat::F16 => 2,
            FloatFormat::F32 => 4,
            FloatFormat::F64 => 8,
        }
    }
}

/// Parsed numpy `descr` string, e.g. `<f4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descr {
    pub format: FloatFormat,
    pub endian: Endian,
}

impl Descr {
    /// Parse a numpy type string. Only float types are accepted.
    pub fn parse(s: &str) -> Result<Descr> {
        let unsupported = || StoreError::UnsupportedDescr(s.to_string());
        let mut chars = s.chars();
        let endian = match chars.next() {
            Some('<') => Endian::Little,
            Some('>') => Endian::Big,
            Some('=') if cfg!(target_endian = "big") => Endian::Big,
            Some('=') => Endian::Little,
            _ => return Err(unsupported()),
        };
        let format = match chars.as_str() {
            "f2" => FloatFormat::F16,
            "f4" => FloatFormat::F32,
            "f8" => FloatFormat::F64,
            _ => return Err(unsupported()),
        };
        Ok(Descr { format, endian })
    }

    /// Little-endian descriptor used when writing `dtype`.
    pub fn for_dtype(dtype: DType) -> Descr {
        let format = match dtype {
            DType::F32 => FloatFormat::F32,
            DType::F16 => FloatFormat::F16,
        };
        Descr {
            format,
            endian: Endian::Little,
        }
    }

    pub fn as_numpy_str(&self) -> String {
        let endian = match self.endian {
            Endian::Little => '<',
            Endian::Big => '>',
        };
        format!("{}f{}", endian, self.format.item_size())
    }
}

/// Parsed `.npy` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyHeader {
    /// Element type and byte order.
    pub descr: Descr,
    /// True if data is stored column-major.
    pub fortran_order: bool,
    /// Array dimensions.
    pub shape: Vec<usize>,
}

impl NpyHeader {
    /// Header for a C-ordered, little-endian `[rows, cols]` matrix.
    pub fn for_matrix(rows: usize, cols: usize, dtype: DType) -> NpyHeader {
        NpyHeader {
            descr: Descr::for_dtype(dtype),
            fortran_order: false,
            shape: vec![rows, cols],
        }
    }

    /// Number of elements described by the shape.
    ///
    /// Fails with `MalformedHeader` when the product does not fit a `usize`.
    pub fn numel(&self) -> Result<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| self.overflow())
    }

    /// Size in bytes of the array payload following the header.
    pub fn data_size(&self) -> Result<usize> {
        self.numel()?
            .checked_mul(self.descr.format.item_size())
            .ok_or_else(|| self.overflow())
    }

    fn overflow(&self) -> StoreError {
        StoreError::MalformedHeader(format!("shape {:?} is too large to address", self.shape))
    }

    /// Parse the preamble and header dictionary from the start of a reader.
    ///
    /// Versions 1.0 (u16 header length), 2.0 and 3.0 (u32 header length) are
    /// accepted. On return the reader is positioned at the first data byte.
    pub fn parse(reader: &mut impl Read) -> Result<NpyHeader> {
        let mut magic = [0u8; 6];
        reader.read_exact(&mut magic)?;
        if magic != NPY_MAGIC {
            return Err(StoreError::InvalidMagic(magic));
        }

        let mut version = [0u8; 2];
        reader.read_exact(&mut version)?;
        let header_len = match version[0] {
            1 => {
                let mut buf2 = [0u8; 2];
                reader.read_exact(&mut buf2)?;
                u16::from_le_bytes(buf2) as usize
            }
            2 | 3 => {
                let mut buf4 = [0u8; 4];
                reader.read_exact(&mut buf4)?;
                u32::from_le_bytes(buf4) as usize
            }
            _ => return Err(StoreError::UnsupportedVersion(version[0], version[1])),
        };

        let mut raw = vec![0u8; header_len];
        reader.read_exact(&mut raw)?;
        let text = String::from_utf8(raw)
            .map_err(|_| StoreError::MalformedHeader("header is not valid UTF-8".to_string()))?;

        let descr = Descr::parse(dict_value(&text, "descr")?.trim_matches('\''))?;
        let fortran_order = match dict_value(&text, "fortran_order")? {
            "True" => true,
            "False" => false,
            other => {
                return Err(StoreError::MalformedHeader(format!(
                    "fortran_order must be True or False, got {}",
                    other
                )))
            }
        };
        let shape = parse_shape(dict_value(&text, "shape")?)?;

        let header = NpyHeader {
            descr,
            fortran_order,
            shape,
        };
        header.data_size()?;
        Ok(header)
    }

    /// Encode the preamble and padded header dictionary.
    ///
    /// Uses version 1.0 unless the header does not fit a u16 length.
    pub fn encode(&self) -> Vec<u8> {
        let dims: Vec<String> = self.shape.iter().map(|d| d.to_string()).collect();
        let shape = match dims.len() {
            1 => format!("({},)", dims[0]),
            _ => format!("({})", dims.join(", ")),
        };
        let dict = format!(
            "{{'descr': '{}', 'fortran_order': {}, 'shape': {}, }}",
            self.descr.as_numpy_str(),
            if self.fortran_order { "True" } else { "False" },
            shape
        );

        let (major, len_bytes) = if dict.len() + 1 + 10 <= u16::MAX as usize {
            (1u8, 2usize)
        } else {
            (2u8, 4usize)
        };
        let preamble = NPY_MAGIC.len() + 2 + len_bytes;
        let unpadded = preamble + dict.len() + 1;
        let padding = (HEADER_ALIGNMENT - unpadded % HEADER_ALIGNMENT) % HEADER_ALIGNMENT;
        let header_len = dict.len() + padding + 1;

        let mut out = Vec::with_capacity(preamble + header_len);
        out.extend_from_slice(&NPY_MAGIC);
        out.extend_from_slice(&[major, 0]);
        if major == 1 {
            out.extend_from_slice(&(header_len as u16).to_le_bytes());
        } else {
            out.extend_from_slice(&(header_len as u32).to_le_bytes());
        }
        out.extend_from_slice(dict.as_bytes());
        out.resize(out.len() + padding, b' ');
        out.push(b'\n');
        out
    }
}

/// Extract the raw text of `key`'s value from a python dict literal.
fn dict_value<'a>(text: &'a str, key: &str) -> Result<&'a str> {
    let needle = format!("'{}'", key);
    let missing = || StoreError::MalformedHeader(format!("missing key '{}'", key));
    let at = text.find(&needle).ok_or_else(missing)?;
    let rest = text[at + needle.len()..].trim_start();
    let rest = rest
        .strip_prefix(':')
        .ok_or_else(|| StoreError::MalformedHeader(format!("no ':' after '{}'", key)))?
        .trim_start();

    let end = match rest.chars().next() {
        Some('\'') => rest[1..].find('\'').map(|i| i + 2),
        Some('(') => rest.find(')').map(|i| i + 1),
        Some(_) => rest.find([',', '}']),
        None => None,
    }
    .ok_or_else(|| StoreError::MalformedHeader(format!("unterminated value for '{}'", key)))?;
    Ok(rest[..end].trim())
}

fn parse_shape(tuple: &str) -> Result<Vec<usize>> {
    let inner = tuple
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| StoreError::MalformedHeader(format!("shape is not a tuple: {}", tuple)))?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim_end_matches('L').parse::<usize>().map_err(|_| {
                StoreError::MalformedHeader(format!("bad shape dimension '{}'", s))
            })
        })
        .collect()
}
