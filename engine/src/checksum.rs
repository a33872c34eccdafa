//! Content checksums for source files and configuration fingerprints
//!
//! Checksums are 128-bit MD5 digests rendered as lowercase hex. Files at or
//! above a threshold are hashed through a memory mapping to avoid copying
//! their contents; smaller files go through a regular read.

use memmap2::MmapOptions;
use std::fs::File;
use std::io;
use std::path::Path;

/// Minimum file size for memory mapping (smaller files use a regular read)
const MMAP_THRESHOLD: u64 = 64 * 1024;

/// Hash a byte slice
pub fn bytes_md5(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Hash the contents of a file
pub fn file_md5(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();

    if size >= MMAP_THRESHOLD {
        // The mapping is read-only and dropped before return; concurrent
        // truncation of a scanned file is outside our contract.
        #[allow(unsafe_code)]
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Ok(bytes_md5(&mmap))
    } else {
        let contents = std::fs::read(path)?;
        Ok(bytes_md5(&contents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_bytes_md5_known_vector() {
        // RFC 1321 test suite
        assert_eq!(bytes_md5(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(bytes_md5(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_file_md5_matches_bytes() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"resource \"aws_s3_bucket\" \"b\" {}\n").unwrap();

        let from_file = file_md5(temp.path()).unwrap();
        let from_bytes = bytes_md5(b"resource \"aws_s3_bucket\" \"b\" {}\n");
        assert_eq!(from_file, from_bytes);
    }

    #[test]
    fn test_file_md5_large_file_uses_mmap_path() {
        let mut temp = NamedTempFile::new().unwrap();
        let chunk = vec![b'x'; 8192];
        for _ in 0..16 {
            temp.write_all(&chunk).unwrap();
        }
        temp.flush().unwrap();

        let big = file_md5(temp.path()).unwrap();
        let direct = bytes_md5(&vec![b'x'; 8192 * 16]);
        assert_eq!(big, direct);
    }
}
