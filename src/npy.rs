//! NumPy `.npy` (format 1.0) codec for 3-D float32 sample tensors
//!
//! Only the layout this crate produces is supported: little-endian `<f4`,
//! C order, three dimensions.

use crate::error::{MidiVelError, Result};
use ndarray::Array3;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const DESCR: &str = "<f4";
/// Header (magic + version + length + dict) is padded to this alignment
const ALIGN: usize = 64;

fn format_err(msg: impl Into<String>) -> MidiVelError {
    MidiVelError::ArrayFormat(msg.into())
}

fn header_dict(shape: &[usize]) -> String {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': ({}), }}",
        DESCR,
        dims.join(", ")
    )
}

/// Serialize an array to `.npy` bytes
pub fn write_array3<W: Write>(mut out: W, array: &Array3<f32>) -> std::io::Result<()> {
    let mut dict = header_dict(array.shape());
    // magic(6) + version(2) + header_len(2) + dict + '\n'
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    let padding = (ALIGN - unpadded % ALIGN) % ALIGN;
    dict.extend(std::iter::repeat(' ').take(padding));
    dict.push('\n');

    out.write_all(MAGIC)?;
    out.write_all(&[1, 0])?;
    out.write_all(&(dict.len() as u16).to_le_bytes())?;
    out.write_all(dict.as_bytes())?;

    // Logical iteration order is C order regardless of memory layout
    for value in array.iter() {
        out.write_all(&value.to_le_bytes())?;
    }
    out.flush()
}

/// Write an array to a `.npy` file
pub fn save_array3<P: AsRef<Path>>(path: P, array: &Array3<f32>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| MidiVelError::io(path, e))?;
    write_array3(BufWriter::new(file), array).map_err(|e| MidiVelError::io(path, e))
}

fn parse_shape(dict: &str) -> Result<Vec<usize>> {
    let start = dict
        .find("'shape':")
        .ok_or_else(|| format_err("header has no shape"))?;
    let rest = &dict[start..];
    let open = rest
        .find('(')
        .ok_or_else(|| format_err("malformed shape tuple"))?;
    let close = rest
        .find(')')
        .ok_or_else(|| format_err("malformed shape tuple"))?;
    rest[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<usize>()
                .map_err(|_| format_err(format!("bad dimension '{}'", part)))
        })
        .collect()
}

/// Deserialize a 3-D `<f4` array from `.npy` bytes
pub fn read_array3<R: Read>(mut input: R) -> Result<Array3<f32>> {
    let io_err = |e: std::io::Error| format_err(format!("truncated array: {}", e));

    let mut prefix = [0u8; 8];
    input.read_exact(&mut prefix).map_err(io_err)?;
    if &prefix[..6] != MAGIC {
        return Err(format_err("not an .npy file"));
    }
    let header_len = match prefix[6] {
        1 => {
            let mut len = [0u8; 2];
            input.read_exact(&mut len).map_err(io_err)?;
            u16::from_le_bytes(len) as usize
        }
        2 | 3 => {
            let mut len = [0u8; 4];
            input.read_exact(&mut len).map_err(io_err)?;
            u32::from_le_bytes(len) as usize
        }
        v => return Err(format_err(format!("unsupported .npy version {}", v))),
    };

    let mut dict = vec![0u8; header_len];
    input.read_exact(&mut dict).map_err(io_err)?;
    let dict = String::from_utf8_lossy(&dict);

    if !dict.contains(&format!("'descr': '{}'", DESCR)) {
        return Err(format_err(format!("expected dtype {}: {}", DESCR, dict.trim())));
    }
    if !dict.contains("'fortran_order': False") {
        return Err(format_err("Fortran-ordered arrays are not supported"));
    }
    let shape = parse_shape(&dict)?;
    let [n, rows, cols] = shape[..] else {
        return Err(format_err(format!("expected 3 dimensions, got {:?}", shape)));
    };

    let byte_len = n
        .checked_mul(rows)
        .and_then(|v| v.checked_mul(cols))
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| format_err(format!("shape {:?} is too large", shape)))?;
    let byte_len = u64::try_from(byte_len)
        .map_err(|_| format_err(format!("shape {:?} is too large", shape)))?;

    // Read what is there rather than trusting the header for the allocation
    let mut raw = Vec::new();
    input
        .take(byte_len)
        .read_to_end(&mut raw)
        .map_err(io_err)?;
    if raw.len() as u64 != byte_len {
        return Err(format_err(format!(
            "truncated array: expected {} data bytes, found {}",
            byte_len,
            raw.len()
        )));
    }
    let values: Vec<f32> = raw
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Array3::from_shape_vec((n, rows, cols), values)
        .map_err(|e| format_err(format!("shape mismatch: {}", e)))
}

/// Read a `.npy` file written by [`save_array3`]
pub fn load_array3<P: AsRef<Path>>(path: P) -> Result<Array3<f32>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| MidiVelError::io(path, e))?;
    read_array3(BufReader::new(file))
}
