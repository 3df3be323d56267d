//! Remote snapshot acquisition

use crate::config::SnapshotLayout;
use crate::error::{MiraiError, Result};
use crate::logging::LogContext;
use log::{debug, error, info};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// File name of the cached archive inside the cache directory
pub const SNAPSHOT_ARCHIVE: &str = "snapshots.zip";

/// Downloads a remote file to a local path
pub trait SnapshotFetcher: Send + Sync {
    fn fetch(&self, uri: &str, destination: &Path) -> Result<()>;
}

/// Plain HTTP(S) GET
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpFetcher;

impl SnapshotFetcher for HttpFetcher {
    fn fetch(&self, uri: &str, destination: &Path) -> Result<()> {
        let transfer = |message: String| MiraiError::Transfer {
            uri: uri.to_string(),
            message,
        };

        let response = ureq::get(uri).call().map_err(|e| transfer(e.to_string()))?;
        let dir = destination
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        // Renamed into place only once complete
        let mut partial = tempfile::NamedTempFile::new_in(&dir)?;
        io::copy(&mut response.into_reader(), &mut partial)
            .map_err(|e| transfer(e.to_string()))?;
        partial
            .persist(destination)
            .map_err(|e| transfer(e.to_string()))?;
        Ok(())
    }
}

/// Fetches and unpacks the snapshot archive unless every file is already present
///
/// The archive is cached at `cache_dir/snapshots.zip`; an existing archive is
/// reused instead of downloaded again. It is extracted into the directory
/// of the first snapshot file and removed afterwards.
pub fn download_if_needed(
    layout: &SnapshotLayout,
    remote_uri: Option<&str>,
    cache_dir: &Path,
    fetcher: &dyn SnapshotFetcher,
    log: &LogContext,
) -> Result<()> {
    if layout.is_present() {
        debug!(target: log.target(), "Snapshots present locally");
        return Ok(());
    }
    let Some(uri) = remote_uri else {
        return Ok(());
    };

    std::fs::create_dir_all(cache_dir)?;
    let archive_path = cache_dir.join(SNAPSHOT_ARCHIVE);
    if archive_path.exists() {
        info!(target: log.target(), "Using cached archive {}", archive_path.display());
    } else {
        info!(target: log.target(), "Downloading snapshots from {}", uri);
        if let Err(e) = fetcher.fetch(uri, &archive_path) {
            error!(
                target: log.target(),
                "An error occurred while downloading from {} to {}: {}",
                uri,
                archive_path.display(),
                e
            );
            return Err(e);
        }
    }

    let destination = layout.destination_dir();
    std::fs::create_dir_all(&destination)?;
    info!(target: log.target(), "Extracting snapshots to {}", destination.display());
    let mut archive = zip::ZipArchive::new(File::open(&archive_path)?)?;
    archive.extract(&destination)?;
    std::fs::remove_file(&archive_path)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Writes a zip holding `entries` and counts fetches
    #[derive(Clone, Default)]
    pub struct ZipFetcher {
        pub entries: Vec<(String, Vec<u8>)>,
        pub calls: Arc<AtomicUsize>,
    }

    impl ZipFetcher {
        pub fn new(entries: &[(&str, &[u8])]) -> Self {
            Self {
                entries: entries
                    .iter()
                    .map(|(name, data)| (name.to_string(), data.to_vec()))
                    .collect(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    pub fn write_zip(path: &Path, entries: &[(String, Vec<u8>)]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            writer
                .start_file(name.as_str(), zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    impl SnapshotFetcher for ZipFetcher {
        fn fetch(&self, _uri: &str, destination: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            write_zip(destination, &self.entries);
            Ok(())
        }
    }

    /// Always fails
    pub struct FailingFetcher;

    impl SnapshotFetcher for FailingFetcher {
        fn fetch(&self, uri: &str, _destination: &Path) -> Result<()> {
            Err(MiraiError::Transfer {
                uri: uri.to_string(),
                message: "connection refused".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;

    fn layout(dir: &Path) -> SnapshotLayout {
        SnapshotLayout::Full {
            encoder: dir.join("snapshots/enc.onnx"),
            transformer: dir.join("snapshots/trans.onnx"),
        }
    }

    #[test]
    fn test_download_and_extract() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join(".cache");
        let fetcher = ZipFetcher::new(&[("enc.onnx", &b"enc"[..]), ("trans.onnx", &b"trans"[..])]);
        let layout = layout(dir.path());

        download_if_needed(
            &layout,
            Some("https://example.org/snapshots.zip"),
            &cache,
            &fetcher,
            &LogContext::default(),
        )
        .unwrap();

        assert!(layout.is_present());
        assert_eq!(fetcher.calls(), 1);
        assert!(!cache.join(SNAPSHOT_ARCHIVE).exists());

        // Files present: no second download
        download_if_needed(
            &layout,
            Some("https://example.org/snapshots.zip"),
            &cache,
            &fetcher,
            &LogContext::default(),
        )
        .unwrap();
        assert_eq!(fetcher.calls(), 1);
    }

    #[test]
    fn test_cached_archive_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join(".cache");
        std::fs::create_dir_all(&cache).unwrap();
        write_zip(
            &cache.join(SNAPSHOT_ARCHIVE),
            &[
                ("enc.onnx".to_string(), b"enc".to_vec()),
                ("trans.onnx".to_string(), b"trans".to_vec()),
            ],
        );
        let layout = layout(dir.path());

        download_if_needed(
            &layout,
            Some("https://example.org/snapshots.zip"),
            &cache,
            &FailingFetcher,
            &LogContext::default(),
        )
        .unwrap();
        assert!(layout.is_present());
    }

    #[test]
    fn test_no_uri_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ZipFetcher::default();
        download_if_needed(
            &layout(dir.path()),
            None,
            &dir.path().join(".cache"),
            &fetcher,
            &LogContext::default(),
        )
        .unwrap();
        assert_eq!(fetcher.calls(), 0);
    }

    #[test]
    fn test_transfer_error_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let result = download_if_needed(
            &layout(dir.path()),
            Some("https://example.org/snapshots.zip"),
            &dir.path().join(".cache"),
            &FailingFetcher,
            &LogContext::default(),
        );
        assert!(matches!(result, Err(MiraiError::Transfer { .. })));
    }
}
