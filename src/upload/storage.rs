//! Upload storage
//!
//! Files are written to a temporary sibling and renamed into place, so a
//! reader of the upload directory never sees a partial file.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Upload directory handle
#[derive(Debug)]
pub struct UploadStore {
    dir: PathBuf,
    /// Disambiguates temporary files of concurrent uploads
    sequence: AtomicU64,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Store `contents` as `file_name` inside the upload directory
    ///
    /// The directory is created when missing. An existing file with the
    /// same name is replaced.
    pub async fn save(&self, file_name: &str, contents: &[u8]) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;

        let target = self.dir.join(file_name);
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let temp = self
            .dir
            .join(format!(".{file_name}.{}.{seq}.part", std::process::id()));

        if let Err(e) = write_file(&temp, contents).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }
        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }
        Ok(target)
    }
}

async fn write_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_creates_directory() {
        let root = tempfile::tempdir().unwrap();
        let store = UploadStore::new(root.path().join("data"));

        let path = store.save("gps.gz", b"\x1f\x8b payload").await.unwrap();
        assert_eq!(path, root.path().join("data").join("gps.gz"));
        assert_eq!(std::fs::read(&path).unwrap(), b"\x1f\x8b payload");
    }

    #[tokio::test]
    async fn test_save_replaces_and_leaves_no_temp_files() {
        let root = tempfile::tempdir().unwrap();
        let store = UploadStore::new(root.path());

        store.save("a.gz", b"first").await.unwrap();
        store.save("a.gz", b"second").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(root.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("a.gz")]);
        assert_eq!(std::fs::read(root.path().join("a.gz")).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_save_fails_when_dir_is_a_file() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("data");
        std::fs::write(&blocker, b"").unwrap();

        let store = UploadStore::new(&blocker);
        assert!(store.save("a.gz", b"x").await.is_err());
    }
}
