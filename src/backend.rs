use std::ffi::OsString;
use std::future::Future;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;

use crate::Error;
use crate::FileStat;

/// The filesystem operations a traversal is built from.
///
/// Every method takes an owned path and returns a `Send` future so the
/// engine can run it as a task. Implementations must not keep state that
/// outlives a single call.
pub trait Backend: Clone + Send + Sync + 'static {
    /// Inspect one path, following symlinks.
    ///
    /// Fails with [`Error::NotFound`] when nothing exists at `path` and with
    /// [`Error::Inaccessible`] for any other metadata failure.
    fn probe(&self, path: PathBuf) -> impl Future<Output = Result<FileStat, Error>> + Send;

    /// List the names of the immediate children of a directory, sorted.
    ///
    /// An empty directory yields an empty list. Fails with
    /// [`Error::ListDir`].
    fn expand(&self, path: PathBuf)
    -> impl Future<Output = Result<Vec<OsString>, Error>> + Send;

    /// Read the full contents of a file. Fails with [`Error::Read`].
    fn read(&self, path: PathBuf) -> impl Future<Output = Result<Vec<u8>, Error>> + Send;
}

/// A backend whose operations all draw from one shared budget.
///
/// Without a limit every call goes straight through.
#[derive(Clone)]
pub(crate) struct Throttled<B> {
    inner: B,
    permits: Option<Arc<Semaphore>>,
}

impl<B: Backend> Throttled<B> {
    pub(crate) fn new(inner: B, limit: Option<NonZeroUsize>) -> Self {
        Self {
            inner,
            permits: limit.map(|n| Arc::new(Semaphore::new(n.get()))),
        }
    }

    async fn permit(&self) -> Result<Option<OwnedSemaphorePermit>, Error> {
        let Some(permits) = &self.permits else {
            return Ok(None);
        };
        permits
            .clone()
            .acquire_owned()
            .await
            .map(Some)
            .map_err(|e| Error::Sync {
                what: "filesystem budget".into(),
                how: e.to_string(),
            })
    }
}

impl<B: Backend> Backend for Throttled<B> {
    fn probe(&self, path: PathBuf) -> impl Future<Output = Result<FileStat, Error>> + Send {
        let this = self.clone();
        async move {
            let _permit = this.permit().await?;
            this.inner.probe(path).await
        }
    }

    fn expand(
        &self,
        path: PathBuf,
    ) -> impl Future<Output = Result<Vec<OsString>, Error>> + Send {
        let this = self.clone();
        async move {
            let _permit = this.permit().await?;
            this.inner.expand(path).await
        }
    }

    fn read(&self, path: PathBuf) -> impl Future<Output = Result<Vec<u8>, Error>> + Send {
        let this = self.clone();
        async move {
            let _permit = this.permit().await?;
            this.inner.read(path).await
        }
    }
}
