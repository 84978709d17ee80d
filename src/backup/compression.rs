use crate::error::{BackupError, Result};
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

#[async_trait]
pub trait Compressor: Send + Sync {
    /// Archives `source` (file or directory) into `<output_dir>/<output_file_name>.zip`.
    /// Both overrides fall back to the source's parent directory and file stem.
    async fn compress(
        &self,
        source: &Path,
        output_file_name: Option<&str>,
        output_dir: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf>;
}

#[derive(Debug, Clone, Default)]
pub struct ZipCompressor;

impl ZipCompressor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Compressor for ZipCompressor {
    async fn compress(
        &self,
        source: &Path,
        output_file_name: Option<&str>,
        output_dir: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        info!("Starting compression for source path: {}", source.display());

        if !source.is_file() && !source.is_dir() {
            error!("Source path not found: {}", source.display());
            return Err(BackupError::Compression(format!(
                "Source path not found: {}",
                source.display()
            )));
        }

        let output = output_path(source, output_file_name, output_dir)?;
        if let Some(parent) = output.parent() {
            if !parent.exists() {
                info!("Output directory does not exist, creating: {}", parent.display());
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| BackupError::Compression(format!("{}: {}", parent.display(), e)))?;
            }
        }

        info!("Compressing {} into {}", source.display(), output.display());

        let task_source = source.to_path_buf();
        let task_output = output.clone();
        let task_cancel = cancel.clone();
        let written = tokio::task::spawn_blocking(move || {
            write_archive(&task_source, &task_output, &task_cancel)
        })
        .await
        .map_err(|e| BackupError::Compression(format!("Compression task failed: {}", e)))?;

        match written {
            Ok(entries) => {
                debug!("Archive contains {} entries", entries);
                info!("Compression completed successfully. Output file: {}", output.display());
                Ok(output)
            }
            Err(e) => {
                if e.is_cancelled() {
                    warn!("Compression was cancelled for source path: {}", source.display());
                    return Err(e);
                }
                error!("Error occurred while compressing {}: {}", source.display(), e);
                Err(match e {
                    BackupError::Io(io) => BackupError::Compression(io.to_string()),
                    other => other,
                })
            }
        }
    }
}

fn output_path(source: &Path, output_file_name: Option<&str>, output_dir: Option<&Path>) -> Result<PathBuf> {
    let target_dir = match output_dir {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => match source.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        },
    };

    let base_name = match output_file_name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| {
                BackupError::Compression(format!("Cannot derive archive name from {}", source.display()))
            })?,
    };

    Ok(target_dir.join(format!("{}.zip", base_name)))
}

/// Creates `dest_path` (never replacing an existing file) and fills it from
/// `source`. A partially written archive is removed on failure.
fn write_archive(source: &Path, dest_path: &Path, cancel: &CancellationToken) -> Result<usize> {
    if cancel.is_cancelled() {
        return Err(BackupError::Cancelled);
    }

    let dest_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest_path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => BackupError::Compression(format!(
                "Archive already exists: {}",
                dest_path.display()
            )),
            _ => BackupError::Io(e),
        })?;

    let written = fill_archive(source, BufWriter::new(dest_file), cancel);
    if written.is_err() {
        if let Err(e) = std::fs::remove_file(dest_path) {
            warn!("Could not remove partial archive {}: {}", dest_path.display(), e);
        }
    }
    written
}

fn fill_archive<W: Write + Seek>(source: &Path, writer: W, cancel: &CancellationToken) -> Result<usize> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(6));
    let mut buffer = vec![0u8; 64 * 1024];
    let mut entries = 0;

    if source.is_dir() {
        let root_name = entry_name(source)?;
        zip.add_directory(format!("{}/", root_name), options)?;
        entries += 1;

        for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            if cancel.is_cancelled() {
                return Err(BackupError::Cancelled);
            }

            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|e| BackupError::Compression(e.to_string()))?;
            let archive_name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .fold(root_name.clone(), |acc, part| format!("{}/{}", acc, part));

            if entry.file_type().is_dir() {
                if std::fs::read_dir(entry.path())?.next().is_none() {
                    zip.add_directory(format!("{}/", archive_name), options)?;
                    entries += 1;
                }
            } else if entry.file_type().is_file() {
                debug!("Adding {} as {}", entry.path().display(), archive_name);
                zip.start_file(archive_name, options)?;
                copy_into(&mut zip, entry.path(), &mut buffer, cancel)?;
                entries += 1;
            }
        }
    } else {
        zip.start_file(entry_name(source)?, options)?;
        copy_into(&mut zip, source, &mut buffer, cancel)?;
        entries += 1;
    }

    zip.finish()?.flush()?;
    Ok(entries)
}

fn entry_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| BackupError::Compression(format!("Path has no file name: {}", path.display())))
}

fn copy_into<W: Write>(writer: &mut W, path: &Path, buffer: &mut [u8], cancel: &CancellationToken) -> Result<()> {
    let mut reader = BufReader::new(File::open(path)?);
    loop {
        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }
        let bytes_read = reader.read(buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::{Cursor, SeekFrom};
    use tempfile::tempdir;
    use zip::ZipArchive;

    /// In-memory sink that fires `cancel` once anything has been written.
    struct CancelOnWrite {
        inner: Cursor<Vec<u8>>,
        cancel: CancellationToken,
    }

    impl Write for CancelOnWrite {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.cancel.cancel();
            self.inner.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.inner.flush()
        }
    }

    impl Seek for CancelOnWrite {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    fn archive_names(path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_compress_single_file_defaults() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("Sales_20250201202105.bak");
        fs::write(&source, b"-- backup bytes").unwrap();

        let output = ZipCompressor::new()
            .compress(&source, None, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output, dir.path().join("Sales_20250201202105.zip"));
        assert_eq!(archive_names(&output), vec!["Sales_20250201202105.bak"]);
    }

    #[tokio::test]
    async fn test_compress_with_overrides() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("db.bak");
        fs::write(&source, b"data").unwrap();
        let out_dir = dir.path().join("nested").join("zips");

        let output = ZipCompressor::new()
            .compress(&source, Some("weekly"), Some(&out_dir), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output, out_dir.join("weekly.zip"));
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_compress_directory_includes_base_directory() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("x");
        fs::create_dir_all(source.join("sub").join("deeper")).unwrap();
        fs::write(source.join("a.txt"), b"a").unwrap();
        fs::write(source.join("sub").join("b.txt"), b"b").unwrap();
        fs::write(source.join("sub").join("deeper").join("c.txt"), b"c").unwrap();

        let output = ZipCompressor::new()
            .compress(&source, None, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output, dir.path().join("x.zip"));
        let names = archive_names(&output);
        assert_eq!(names.len(), 3 + 1);
        assert_eq!(
            names,
            vec!["x/", "x/a.txt", "x/sub/b.txt", "x/sub/deeper/c.txt"]
        );
    }

    #[tokio::test]
    async fn test_missing_source_is_compression_error() {
        let dir = tempdir().unwrap();
        let err = ZipCompressor::new()
            .compress(&dir.path().join("gone.bak"), None, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Compression(_)));
    }

    #[tokio::test]
    async fn test_cancelled_compression_leaves_no_archive() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("db.bak");
        fs::write(&source, b"data").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = ZipCompressor::new()
            .compress(&source, None, None, &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(!dir.path().join("db.zip").exists());
    }

    #[tokio::test]
    async fn test_existing_archive_is_not_replaced() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("db.bak");
        fs::write(&source, b"data").unwrap();
        let existing = dir.path().join("db.zip");
        fs::write(&existing, b"previous archive").unwrap();

        let err = ZipCompressor::new()
            .compress(&source, None, None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::Compression(ref msg) if msg.contains("already exists")));
        assert_eq!(fs::read(&existing).unwrap(), b"previous archive");
    }

    #[tokio::test]
    async fn test_zip_source_is_left_intact() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("nightly.zip");
        fs::write(&source, b"original bytes").unwrap();

        let err = ZipCompressor::new()
            .compress(&source, None, None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::Compression(_)));
        assert_eq!(fs::read(&source).unwrap(), b"original bytes");
    }

    #[tokio::test]
    async fn test_cancelled_run_keeps_existing_archive() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("db.bak");
        fs::write(&source, b"data").unwrap();
        let existing = dir.path().join("db.zip");
        fs::write(&existing, b"previous archive").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = ZipCompressor::new()
            .compress(&source, None, None, &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(fs::read(&existing).unwrap(), b"previous archive");
    }

    #[test]
    fn test_cancel_between_entries_stops_archive() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("x");
        fs::create_dir_all(&source).unwrap();
        for i in 0..5 {
            fs::write(source.join(format!("{}.txt", i)), b"payload").unwrap();
        }
        let cancel = CancellationToken::new();
        let sink = CancelOnWrite {
            inner: Cursor::new(Vec::new()),
            cancel: cancel.clone(),
        };

        let err = fill_archive(&source, sink, &cancel).unwrap_err();

        assert!(err.is_cancelled());
    }

    #[test]
    fn test_failed_archive_is_removed() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("gone.zip");

        let err = write_archive(&dir.path().join("gone.bak"), &output, &CancellationToken::new()).unwrap_err();

        assert!(matches!(err, BackupError::Io(_)));
        assert!(!output.exists());
    }
}
