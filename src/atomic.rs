//! Write-to-temp then rename, used when an upload replaces an existing file.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use uuid::Uuid;

/// Deletes the file at its path when dropped, unless `keep` was called.
///
/// Holding one across an `.await` means a cancelled request does not leave
/// partial files behind.
#[derive(Debug)]
pub struct TempPath {
    path: PathBuf,
    armed: bool,
}

impl TempPath {
    /// Takes ownership of `path` for removal on drop.
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// Path that will be removed on drop.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarms the guard and hands the path back.
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for TempPath {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Temp file beside its target that replaces the target on `finalize`.
///
/// Dropping it without finalizing removes the temp file.
pub struct AtomicFile {
    target: PathBuf,
    temp: TempPath,
    file: File,
}

impl AtomicFile {
    /// Creates `.<name>.tmp.<uuid>` next to `target`.
    pub async fn new(target: &Path) -> io::Result<Self> {
        let parent = target
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "target has no parent"))?;
        let base = target
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| "upload".into());
        let temp_path = parent.join(format!(".{base}.tmp.{}", Uuid::new_v4()));
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp: TempPath::new(temp_path),
            file,
        })
    }

    /// Writer for the temp file.
    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// Flushes to disk and renames over the target.
    pub async fn finalize(self) -> io::Result<()> {
        let Self { target, temp, file } = self;
        file.sync_all().await?;
        drop(file);

        if let Err(err) = fs::rename(temp.path(), &target).await {
            #[cfg(windows)]
            {
                if fs::remove_file(&target).await.is_ok()
                    && fs::rename(temp.path(), &target).await.is_ok()
                {
                    temp.keep();
                    return Ok(());
                }
            }
            return Err(err);
        }
        temp.keep();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn finalize_replaces_target() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("note.txt");
        std::fs::write(&target, b"old").expect("write");

        let mut atomic = AtomicFile::new(&target).await.expect("atomic file");
        atomic.file_mut().write_all(b"new").await.expect("write");
        atomic.finalize().await.expect("finalize");

        assert_eq!(std::fs::read(&target).expect("read"), b"new");
        assert_eq!(std::fs::read_dir(temp.path()).expect("read dir").count(), 1);
    }

    #[tokio::test]
    async fn dropping_unfinished_file_leaves_target_untouched() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("note.txt");
        std::fs::write(&target, b"old").expect("write");

        let mut atomic = AtomicFile::new(&target).await.expect("atomic file");
        atomic.file_mut().write_all(b"partial").await.expect("write");
        drop(atomic);

        assert_eq!(std::fs::read(&target).expect("read"), b"old");
        assert_eq!(std::fs::read_dir(temp.path()).expect("read dir").count(), 1);
    }

    #[test]
    fn temp_path_removes_unless_kept() {
        let temp = tempdir().expect("tempdir");
        let dropped = temp.path().join("dropped.part");
        let kept = temp.path().join("kept.part");
        std::fs::write(&dropped, b"x").expect("write");
        std::fs::write(&kept, b"y").expect("write");

        drop(TempPath::new(dropped.clone()));
        let returned = TempPath::new(kept.clone()).keep();

        assert!(!dropped.exists());
        assert_eq!(returned, kept);
        assert!(kept.exists());
    }
}
