use std::{
    convert::TryInto,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    mem::size_of,
    path::Path,
};

use crate::{error::SmallError, types::SmallResult};

pub struct SmallFile {
    file: File,
}

impl SmallFile {
    /// Create a new `SmallFile` from the given file path and open it
    /// with read and write mode.
    ///
    /// If the file doesn't exist, it will be created.
    pub fn new<P: AsRef<Path>>(file_path: P) -> Result<Self, SmallError> {
        let file = OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .open(file_path)?;

        Ok(Self { file })
    }

    pub fn get_size(&self) -> Result<u64, SmallError> {
        let metadata = self.file.metadata()?;
        Ok(metadata.len())
    }

    pub fn set_len(&self, len: u64) -> SmallResult {
        self.file.set_len(len)?;
        Ok(())
    }

    /// Read exactly `len` bytes starting at `offset`.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, SmallError> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf).map_err(|e| {
            SmallError::storage_io(&format!(
                "read {} bytes at offset {} failed: {}",
                len, offset, e
            ))
        })?;
        Ok(buf)
    }

    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> SmallResult {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    pub fn flush(&mut self) -> SmallResult {
        self.file.flush()?;
        Ok(())
    }
}

pub fn read_exact<R: Read>(reader: &mut R, bytes_count: usize) -> Result<Vec<u8>, SmallError> {
    let mut buffer = vec![0u8; bytes_count];
    reader.read_exact(&mut buffer).map_err(|e| {
        SmallError::inconsistency(&format!("decode error, expect {} bytes: {}", bytes_count, e))
    })?;
    Ok(buffer)
}

/// A wrapper for `Decodeable::decode_from`.
///
/// The advantage of this wrapper is doesn't require explicit type
/// annotation when type inference is possible.
pub fn read_into<T: Decodeable, R: Read>(reader: &mut R) -> Result<T, SmallError> {
    T::decode_from(reader)
}

pub struct SmallWriter {
    buf: Vec<u8>,
}

impl SmallWriter {
    /// Create a new `SmallWriter` with an empty buffer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Create a new `SmallWriter` with a buffer of the given capacity.
    pub fn new_reserved(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn write<T: Encodeable>(&mut self, obj: &T) {
        obj.encode(self);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn to_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Pad the buffer with zeros up to `size` bytes.
    ///
    /// Overflowing the page is a layout defect.
    pub fn to_padded_bytes(mut self, size: usize) -> Result<Vec<u8>, SmallError> {
        if self.buf.len() > size {
            return Err(SmallError::inconsistency(&format!(
                "buffer size is larger than the given size: {} > {}",
                self.buf.len(),
                size
            )));
        }

        self.buf.resize(size, 0);
        Ok(self.buf)
    }
}

impl Default for SmallWriter {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Encodeable {
    fn encode(&self, writer: &mut SmallWriter);

    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = SmallWriter::new();
        self.encode(&mut writer);
        writer.to_bytes()
    }
}

pub trait Decodeable: Sized {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, SmallError>;
}

/// # Format
///
/// - 1 byte (0 for false, 1 for true)
impl Encodeable for bool {
    fn encode(&self, writer: &mut SmallWriter) {
        writer.write_bytes(&[*self as u8]);
    }
}

impl Decodeable for bool {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, SmallError> {
        Ok(u8::decode_from(reader)? == 1)
    }
}

macro_rules! impl_serialization {
    (for $($t:ty),+) => {
        $(
            impl Encodeable for $t {
                fn encode(&self, writer: &mut SmallWriter) {
                    writer.write_bytes(&self.to_le_bytes());
                }
            }

            impl Decodeable for $t {
                fn decode_from<R: Read>(reader: &mut R) -> Result<Self, SmallError> {
                    let bytes = read_exact(reader, size_of::<Self>())?;
                    let array = bytes.try_into().map_err(|_| {
                        SmallError::inconsistency("decode error, wrong integer width")
                    })?;
                    Ok(Self::from_le_bytes(array))
                }
            }
        )*
    }
}

impl_serialization!(for u8, u16, u32, u64, i32, i64);

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_writer_padding() {
        let mut writer = SmallWriter::new();
        writer.write(&7u32);
        writer.write(&true);
        let bytes = writer.to_padded_bytes(8).unwrap();
        assert_eq!(bytes, vec![7, 0, 0, 0, 1, 0, 0, 0]);

        let mut reader = Cursor::new(bytes);
        assert_eq!(read_into::<u32, _>(&mut reader).unwrap(), 7);
        assert!(read_into::<bool, _>(&mut reader).unwrap());
    }

    #[test]
    fn test_writer_overflow() {
        let mut writer = SmallWriter::new();
        writer.write(&1u64);
        assert!(writer.to_padded_bytes(4).is_err());
    }

    #[test]
    fn test_short_read() {
        let mut reader = Cursor::new(vec![1u8, 2]);
        assert!(read_into::<u32, _>(&mut reader).is_err());
    }
}
