use std::ffi::OsString;
use std::future::Future;
use std::path::PathBuf;

use futures_lite::StreamExt;
use log::trace;

use crate::Error;
use crate::FileStat;
use crate::backend::Backend;

/// [`Backend`] over the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeFs;

impl NativeFs {
    /// Creates a local filesystem backend.
    pub fn new() -> Self {
        Self
    }
}

impl Backend for NativeFs {
    fn probe(&self, path: PathBuf) -> impl Future<Output = Result<FileStat, Error>> + Send {
        async move {
            trace!("probe {}", path.display());
            let metadata = tokio::fs::metadata(&path)
                .await
                .map_err(|e| Error::probe(&path, e))?;
            Ok(FileStat::from_metadata(&metadata))
        }
    }

    fn expand(
        &self,
        path: PathBuf,
    ) -> impl Future<Output = Result<Vec<OsString>, Error>> + Send {
        async move {
            trace!("expand {}", path.display());
            let list_err = |e: std::io::Error| Error::ListDir {
                what: path.to_string_lossy().to_string(),
                how: e.to_string(),
            };
            let mut entries = async_fs::read_dir(&path).await.map_err(list_err)?;

            let mut names = Vec::new();
            while let Some(entry) = entries.next().await {
                let entry = entry.map_err(list_err)?;
                names.push(entry.file_name());
            }
            names.sort();
            Ok(names)
        }
    }

    fn read(&self, path: PathBuf) -> impl Future<Output = Result<Vec<u8>, Error>> + Send {
        async move {
            trace!("read {}", path.display());
            tokio::fs::read(&path).await.map_err(|e| Error::Read {
                what: path.to_string_lossy().to_string(),
                how: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Kind;
    use crate::TestRoot;

    #[tokio::test]
    async fn probe_classifies_files_and_directories() {
        let root = TestRoot::new(None).await.unwrap();
        let fs = NativeFs::new();

        let dir = fs.probe(root.path().join("dir1")).await.unwrap();
        assert_eq!(dir.kind(), Kind::Directory);

        let file = fs.probe(root.path().join("file1.txt")).await.unwrap();
        assert_eq!(file.kind(), Kind::File);
        assert_eq!(file.size, "file1".len() as u64);
    }

    #[tokio::test]
    async fn probe_missing_path_is_not_found() {
        let root = TestRoot::new(None).await.unwrap();
        let err = NativeFs::new()
            .probe(root.path().join("missingdir"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn expand_lists_sorted_child_names() {
        let root = TestRoot::new(None).await.unwrap();
        let names = NativeFs::new()
            .expand(root.path().join("dir1"))
            .await
            .unwrap();
        assert_eq!(names, vec![OsString::from("dir2"), OsString::from("file3.txt")]);
    }

    #[tokio::test]
    async fn expand_empty_directory_is_empty() {
        let root = TestRoot::new(None).await.unwrap();
        let names = NativeFs::new()
            .expand(root.path().join("dir1/dir2/dir_empty1"))
            .await
            .unwrap();
        assert!(names.is_empty());
    }

    #[tokio::test]
    async fn expand_file_fails() {
        let root = TestRoot::new(None).await.unwrap();
        let err = NativeFs::new()
            .expand(root.path().join("file1.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ListDir { .. }));
    }

    #[tokio::test]
    async fn read_returns_contents() {
        let root = TestRoot::new(None).await.unwrap();
        let fs = NativeFs::new();
        let bytes = fs.read(root.path().join("dir3/file6.txt")).await.unwrap();
        assert_eq!(bytes, b"file6");
        assert!(matches!(
            fs.read(root.path().join("dir3")).await,
            Err(Error::Read { .. })
        ));
    }
}
