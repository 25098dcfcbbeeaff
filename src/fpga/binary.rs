//! Bitstream loading

use crate::error::{Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// A compiled bitstream read fully into memory
#[derive(Debug, Clone)]
pub struct BinaryReader {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl BinaryReader {
    /// Reads the whole file at `path`
    ///
    /// Fails if the file cannot be opened or read, or if fewer/more bytes are
    /// read than its metadata reports.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
        let expected = file.metadata().map_err(|e| Error::io(path, e))?.len();

        let bytes = read_exact_len(&mut file, path, expected)?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "bitstream loaded");

        Ok(Self {
            path: path.to_path_buf(),
            bytes,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Reads `reader` to the end, failing unless exactly `expected` bytes arrive
fn read_exact_len<Rd: Read>(reader: &mut Rd, path: &Path, expected: u64) -> Result<Vec<u8>> {
    let capacity = usize::try_from(expected).map_err(|_| Error::Allocation {
        size: usize::MAX,
        reason: format!("{} bytes do not fit in memory", expected),
    })?;
    let mut bytes = Vec::with_capacity(capacity);
    reader.read_to_end(&mut bytes).map_err(|e| Error::io(path, e))?;

    let actual = bytes.len() as u64;
    if actual != expected {
        return Err(Error::SizeMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_file;

    #[test]
    fn reads_exact_file_contents() {
        let contents: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();
        let path = test_file("reader_exact.aocx", &contents);

        let binary = BinaryReader::open(&path).unwrap();
        assert_eq!(binary.len(), contents.len());
        assert_eq!(binary.len() as u64, std::fs::metadata(&path).unwrap().len());
        assert_eq!(binary.as_bytes(), &contents[..]);
        assert_eq!(binary.path(), path.as_path());

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn empty_file_yields_empty_binary() {
        let path = test_file("reader_empty.aocx", b"");
        let binary = BinaryReader::open(&path).unwrap();
        assert!(binary.is_empty());
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn short_read_is_a_size_mismatch() {
        let path = Path::new("short.aocx");
        let mut reader = std::io::Cursor::new(vec![1u8; 10]);
        let err = read_exact_len(&mut reader, path, 16).unwrap_err();
        assert!(
            matches!(err, Error::SizeMismatch { expected: 16, actual: 10, .. }),
            "{err}"
        );

        let mut reader = std::io::Cursor::new(vec![1u8; 20]);
        let err = read_exact_len(&mut reader, path, 16).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { expected: 16, actual: 20, .. }));

        let mut reader = std::io::Cursor::new(vec![1u8; 16]);
        assert_eq!(read_exact_len(&mut reader, path, 16).unwrap(), vec![1u8; 16]);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = BinaryReader::open("/nonexistent/fpga_cl/program.aocx").unwrap_err();
        assert!(matches!(err, Error::Io { .. }), "{err}");
    }
}
