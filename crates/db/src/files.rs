//! Filesystem helpers shared by the file backend and exports.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Timestamp format used in backup and export file names.
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

/// Create a new file named `<prefix>_<timestamp>.<ext>` in `dir`, never
/// reusing an existing name. Returns the open file and its path.
pub async fn create_unique(dir: &Path, prefix: &str, ext: &str) -> io::Result<(fs::File, PathBuf)> {
    fs::create_dir_all(dir).await?;
    let stamp = chrono::Utc::now().format(STAMP_FORMAT).to_string();

    for attempt in 0u32.. {
        let name = match attempt {
            0 => format!("{prefix}_{stamp}.{ext}"),
            n => format!("{prefix}_{stamp}_{n}.{ext}"),
        };
        let path = dir.join(name);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::other("no free file name"))
}

/// Write `bytes` to a fresh file and flush it to disk.
pub async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// Write `bytes` into an already open file and flush it to disk.
pub async fn fill_synced(mut file: fs::File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// Copy `source` into a uniquely named backup under `dir`.
///
/// Returns `None` when there is nothing to back up yet.
pub async fn backup(source: &Path, dir: &Path) -> io::Result<Option<PathBuf>> {
    let bytes = match fs::read(source).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("jsonl");
    let (file, path) = create_unique(dir, "backup", ext).await?;
    if let Err(e) = fill_synced(file, &bytes).await {
        remove_quietly(&path).await;
        return Err(e);
    }
    Ok(Some(path))
}

/// Move `tmp` over `path`. When the move fails, `tmp` and the backup taken
/// for this write are removed so a failed write leaves no snapshot behind.
pub async fn commit(tmp: &Path, path: &Path, backup: Option<&Path>) -> io::Result<()> {
    if let Err(e) = fs::rename(tmp, path).await {
        remove_quietly(tmp).await;
        if let Some(backup) = backup {
            remove_quietly(backup).await;
        }
        return Err(e);
    }
    Ok(())
}

/// Remove `path`, logging anything other than it already being gone.
pub async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Could not remove file");
        }
    }
}

/// Sibling path used for the write-then-rename step.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
