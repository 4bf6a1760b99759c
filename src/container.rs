//! ZIP container access for archive-based formats.

use std::io::Read;

use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{Error, Result};
use crate::io::{ByteSource, ByteSourceCursor};

/// Read-only view of a ZIP archive backed by a [`ByteSource`].
pub struct ZipContainer<'a> {
    archive: ZipArchive<ByteSourceCursor<'a>>,
}

impl<'a> ZipContainer<'a> {
    pub fn open(source: &'a dyn ByteSource) -> Result<Self> {
        let archive = ZipArchive::new(ByteSourceCursor::new(source))?;
        Ok(Self { archive })
    }

    /// Entry names in central-directory order.
    pub fn names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.archive.index_for_name(name).is_some()
    }

    /// Read a whole entry. A missing entry is `MalformedInput`.
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        self.read_limited(name, u64::MAX)
    }

    /// Read an entry whose uncompressed size must not exceed `limit`.
    ///
    /// Falls back to the percent-decoded name, which malformed archives
    /// sometimes use.
    pub fn read_limited(&mut self, name: &str, limit: u64) -> Result<Vec<u8>> {
        let name = if self.contains(name) {
            name.to_string()
        } else {
            let decoded = crate::model::percent_decode(name);
            if !self.contains(&decoded) {
                return Err(Error::malformed(format!("missing archive entry `{name}`")));
            }
            decoded
        };

        let file = match self.archive.by_name(&name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => {
                return Err(Error::malformed(format!("missing archive entry `{name}`")));
            }
            Err(e) => return Err(e.into()),
        };
        if file.size() > limit {
            return Err(Error::malformed(format!(
                "archive entry `{name}` is {} bytes, over the {limit} byte limit",
                file.size()
            )));
        }
        let mut contents = Vec::with_capacity(file.size().min(1 << 20) as usize);
        file.take(limit).read_to_end(&mut contents)?;
        Ok(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemorySource;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn archive(entries: &[(&str, &[u8])]) -> MemorySource {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        MemorySource::new(writer.finish().unwrap().into_inner())
    }

    #[test]
    fn test_read_entries() {
        let source = archive(&[("a.txt", b"alpha"), ("dir/b c.txt", b"beta")]);
        let mut zip = ZipContainer::open(&source).unwrap();
        assert_eq!(zip.len(), 2);
        assert!(zip.contains("a.txt"));
        assert_eq!(zip.read("a.txt").unwrap(), b"alpha");
        assert_eq!(zip.read("dir/b%20c.txt").unwrap(), b"beta");
    }

    #[test]
    fn test_missing_entry_is_malformed() {
        let source = archive(&[("a.txt", b"alpha")]);
        let mut zip = ZipContainer::open(&source).unwrap();
        assert!(zip.read("nope").unwrap_err().is_malformed());
    }

    #[test]
    fn test_size_limit() {
        let source = archive(&[("big", &[7u8; 100])]);
        let mut zip = ZipContainer::open(&source).unwrap();
        assert!(zip.read_limited("big", 10).unwrap_err().is_malformed());
        assert_eq!(zip.read_limited("big", 100).unwrap().len(), 100);
    }

    #[test]
    fn test_not_a_zip() {
        let source = MemorySource::new(b"definitely not a zip archive".to_vec());
        assert!(ZipContainer::open(&source).is_err());
    }
}
