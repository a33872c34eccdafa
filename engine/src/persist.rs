//! Persistence codec for the index envelope
//!
//! The envelope is pretty-printed JSON streamed through a gzip compressor
//! into a temporary file, which is then renamed over the final path. Rename
//! on the same filesystem is the atomicity primitive: readers either see the
//! previous envelope or the new one, never a partial write. Failure at any
//! step unlinks the temporary file and propagates the error.

use crate::cancel::{CancelToken, Cancelled};
use crate::config::{CODEC_VERSION, TOOL_VERSION};
use crate::types::IndexEnvelope;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// I/O or codec failure while writing or reading an envelope
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("index I/O failed at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode index envelope for {path:?}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode index envelope at {path:?}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Envelope parsed but violates an invariant
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("envelope version {found:?} does not match codec version {expected:?}")]
    VersionMismatch { found: String, expected: String },
}

/// Write `envelope` to `path` using the atomic temp-and-rename protocol
///
/// Stamps the codec version, current time and tool identifier before
/// encoding.
pub fn write(envelope: &mut IndexEnvelope, path: &Path, cancel: &CancelToken) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| PersistError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    envelope.version = CODEC_VERSION.to_owned();
    envelope.indexed_at = now_millis();
    envelope.tool_version = TOOL_VERSION.to_owned();

    let tmp_path = tmp_path_for(path);
    cancel.check()?;

    let result = write_compressed(envelope, &tmp_path, cancel);
    if let Err(err) = result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(err);
    }

    if cancel.is_cancelled() {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(Cancelled.into());
    }

    std::fs::rename(&tmp_path, path).map_err(|source| {
        let _ = std::fs::remove_file(&tmp_path);
        PersistError::Io { path: path.to_path_buf(), source }
    })
}

fn write_compressed(
    envelope: &IndexEnvelope,
    tmp_path: &Path,
    cancel: &CancelToken,
) -> Result<(), PersistError> {
    cancel.check()?;

    let file = File::create(tmp_path).map_err(|source| PersistError::Io {
        path: tmp_path.to_path_buf(),
        source,
    })?;
    let writer = BufWriter::new(file);
    let mut encoder = GzEncoder::new(writer, Compression::default());

    serde_json::to_writer_pretty(&mut encoder, envelope).map_err(|source| {
        PersistError::Encode { path: tmp_path.to_path_buf(), source }
    })?;

    let mut writer = encoder
        .finish()
        .map_err(|source| PersistError::Io { path: tmp_path.to_path_buf(), source })?;
    std::io::Write::flush(&mut writer)
        .map_err(|source| PersistError::Io { path: tmp_path.to_path_buf(), source })?;

    Ok(())
}

/// Read and decompress the envelope at `path`
///
/// Decoding ignores unknown fields; structural validation happens in
/// [`check`].
pub fn read(path: &Path) -> Result<IndexEnvelope, PersistError> {
    let file = File::open(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let decoder = GzDecoder::new(BufReader::new(file));

    serde_json::from_reader(decoder).map_err(|source| PersistError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Envelope-level validation after a successful decode
///
/// The version string must match exactly (no migration path at v1). A
/// metadata resource count that disagrees with the actual list length is
/// logged but tolerated.
pub fn check(envelope: &IndexEnvelope) -> Result<(), ValidateError> {
    if envelope.version != CODEC_VERSION {
        return Err(ValidateError::VersionMismatch {
            found: envelope.version.clone(),
            expected: CODEC_VERSION.to_owned(),
        });
    }

    let actual = envelope.index.resources.len() as u32;
    if envelope.metadata.total_resources != actual {
        log::warn!(
            "envelope metadata claims {} resources but the index holds {}",
            envelope.metadata.total_resources,
            actual
        );
    }

    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_owned());
    name.push_str(".tmp");
    path.with_file_name(name)
}

/// Current time in epoch milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index;
    use crate::taxonomy::Taxonomy;
    use crate::types::{ConfigMap, ResourceRecord};
    use tempfile::TempDir;

    fn sample_envelope() -> IndexEnvelope {
        let taxonomy = Taxonomy::builtin();
        let record = ResourceRecord {
            resource_type: "aws_s3_bucket".to_owned(),
            name: "b".to_owned(),
            file_path: "prod/s3.tf".to_owned(),
            line_start: 1,
            line_end: 3,
            config: ConfigMap::new(),
            control_codes: Vec::new(),
        };
        let index = index::build_index(&taxonomy, vec![(record, 42)]);
        IndexEnvelope {
            metadata: crate::types::ScanMetadata {
                total_resources: 1,
                total_files: 1,
                ..Default::default()
            },
            index,
            ..Default::default()
        }
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache").join("index.json.gz");

        let mut envelope = sample_envelope();
        write(&mut envelope, &path, &CancelToken::new()).unwrap();

        // Stamped on write
        assert_eq!(envelope.version, CODEC_VERSION);
        assert!(envelope.indexed_at > 0);
        assert_eq!(envelope.tool_version, TOOL_VERSION);

        let loaded = read(&path).unwrap();
        assert_eq!(loaded, envelope);
        check(&loaded).unwrap();
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json.gz");

        let mut envelope = sample_envelope();
        write(&mut envelope, &path, &CancelToken::new()).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_payload_is_gzip_compressed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json.gz");

        let mut envelope = sample_envelope();
        write(&mut envelope, &path, &CancelToken::new()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b], "gzip magic");
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut envelope = sample_envelope();
        envelope.version = "0.9".to_owned();
        assert!(matches!(
            check(&envelope),
            Err(ValidateError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_resource_count_mismatch_tolerated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json.gz");

        let mut envelope = sample_envelope();
        envelope.metadata.total_resources = 99;
        write(&mut envelope, &path, &CancelToken::new()).unwrap();

        let loaded = read(&path).unwrap();
        // Warns, does not fail
        check(&loaded).unwrap();
    }

    #[test]
    fn test_corrupt_payload_is_a_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json.gz");
        std::fs::write(&path, b"not gzip at all").unwrap();

        assert!(matches!(read(&path), Err(PersistError::Decode { .. })));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.json.gz");
        assert!(matches!(read(&path), Err(PersistError::Io { .. })));
    }

    #[test]
    fn test_cancelled_write_unlinks_tmp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json.gz");

        let cancel = CancelToken::new();
        cancel.cancel();
        let mut envelope = sample_envelope();
        let err = write(&mut envelope, &path, &cancel).unwrap_err();
        assert!(matches!(err, PersistError::Cancelled(_)));
        assert!(!path.exists());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_unknown_fields_ignored_on_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json.gz");

        let mut envelope = sample_envelope();
        write(&mut envelope, &path, &CancelToken::new()).unwrap();

        // Re-encode with an extra field injected
        let decoded: serde_json::Value = {
            let file = File::open(&path).unwrap();
            serde_json::from_reader(GzDecoder::new(BufReader::new(file))).unwrap()
        };
        let mut obj = decoded;
        obj.as_object_mut()
            .unwrap()
            .insert("future_field".to_owned(), serde_json::json!({"x": 1}));
        {
            let file = File::create(&path).unwrap();
            let mut enc = GzEncoder::new(BufWriter::new(file), Compression::default());
            serde_json::to_writer(&mut enc, &obj).unwrap();
            enc.finish().unwrap();
        }

        let loaded = read(&path).unwrap();
        assert_eq!(loaded.index.resources.len(), 1);
    }
}
