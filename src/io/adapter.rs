use super::byte_source::ByteSource;
use std::io::{self, Read, Seek, SeekFrom};

/// Wraps a borrowed [`ByteSource`] into a stateful `Read + Seek` stream.
/// Used to pass a source into libraries like `zip::ZipArchive`.
pub struct ByteSourceCursor<'a> {
    inner: &'a dyn ByteSource,
    position: u64,
}

impl<'a> ByteSourceCursor<'a> {
    pub fn new(inner: &'a dyn ByteSource) -> Self {
        Self { inner, position: 0 }
    }
}

impl Read for ByteSourceCursor<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let total_len = self.inner.len();

        if self.position >= total_len {
            return Ok(0);
        }
        let max_read = (total_len - self.position).min(buf.len() as u64) as usize;

        let read = self
            .inner
            .read_at_into(self.position, &mut buf[..max_read])?;
        self.position += read as u64;

        Ok(read)
    }
}

impl Seek for ByteSourceCursor<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let total_len = self.inner.len() as i64;
        let current_pos = self.position as i64;

        let new_pos = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(p) => total_len + p,
            SeekFrom::Current(p) => current_pos + p,
        };

        if new_pos < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "Seek before 0"));
        }

        self.position = new_pos as u64;
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemorySource;

    #[test]
    fn test_cursor_reads_and_seeks() {
        let source = MemorySource::new(b"abcdefgh".to_vec());
        let mut cursor = ByteSourceCursor::new(&source);

        let mut buf = [0u8; 3];
        assert_eq!(cursor.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"abc");

        cursor.seek(SeekFrom::End(-2)).unwrap();
        let mut rest = Vec::new();
        cursor.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"gh");

        assert!(cursor.seek(SeekFrom::Current(-100)).is_err());
    }
}
