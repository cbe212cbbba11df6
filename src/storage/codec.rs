//! Flat little-endian `i32` array files.
//!
//! Neither file carries a header; the element count is the file length divided
//! by [`ELEMENT_SIZE`].

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{GraphError, Result};

/// Width of one persisted element in bytes.
pub const ELEMENT_SIZE: usize = std::mem::size_of::<i32>();

/// Reads a whole array file into memory.
///
/// Fails if the file is missing, unreadable, or its length is not a multiple
/// of [`ELEMENT_SIZE`].
pub fn read_i32_file(path: &Path) -> Result<Vec<i32>> {
    let bytes = fs::read(path).map_err(|err| GraphError::file(path, err))?;
    decode_i32s(&bytes).map_err(|len| {
        GraphError::corruption(format!(
            "{}: size {len} is not a multiple of {ELEMENT_SIZE}",
            path.display()
        ))
    })
}

/// Writes `values` to `path`, truncating any previous content.
pub fn write_i32_file(path: &Path, values: &[i32]) -> Result<()> {
    let file = File::create(path).map_err(|err| GraphError::file(path, err))?;
    let mut out = BufWriter::with_capacity(1 << 20, file);
    for value in values {
        out.write_all(&value.to_le_bytes())
            .map_err(|err| GraphError::file(path, err))?;
    }
    out.flush().map_err(|err| GraphError::file(path, err))?;
    out.get_ref()
        .sync_all()
        .map_err(|err| GraphError::file(path, err))?;
    Ok(())
}

/// Decodes a byte buffer; returns the offending length on a ragged tail.
pub(crate) fn decode_i32s(bytes: &[u8]) -> std::result::Result<Vec<i32>, usize> {
    if bytes.len() % ELEMENT_SIZE != 0 {
        return Err(bytes.len());
    }
    Ok(bytes
        .chunks_exact(ELEMENT_SIZE)
        .map(|chunk| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_then_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("values.bin");
        let values = vec![2, 4, -1, i32::MAX, 0];
        write_i32_file(&path, &values).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 20);
        assert_eq!(read_i32_file(&path).unwrap(), values);
    }

    #[test]
    fn ragged_file_is_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ragged.bin");
        fs::write(&path, [1u8, 0, 0, 0, 7]).unwrap();
        let err = read_i32_file(&path).unwrap_err();
        assert!(matches!(err, GraphError::Corruption(_)), "{err}");
    }

    #[test]
    fn missing_file_names_the_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.bin");
        let err = read_i32_file(&path).unwrap_err();
        assert!(err.to_string().contains("absent.bin"));
    }
}
