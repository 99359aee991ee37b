//! Files-only and pattern layers over the traversal.
//!
//! Both layers only narrow what reaches the caller's handlers; they never
//! change what the engine visits.

use std::path::Path as StdPath;

use crate::Error;
use crate::Handlers;
use crate::Pattern;
use crate::WalkOptions;
use crate::backend::Backend;
use crate::engine::traverse_with;
use crate::native_fs::NativeFs;

/// Walks `root` on the local filesystem, reporting files only.
///
/// See [`traverse_files_with`].
pub async fn traverse_files<P: AsRef<StdPath>>(
    root: P,
    handlers: Handlers<'_>,
    options: &WalkOptions,
) -> Result<(), Error> {
    traverse_files_with(&NativeFs, root, handlers, options).await
}

/// Like [`traverse_with`], but directory entries are dropped from both the
/// entry stream and the completion. Errors from any branch, directories
/// included, still reach the handlers.
pub async fn traverse_files_with<B, P>(
    backend: &B,
    root: P,
    handlers: Handlers<'_>,
    options: &WalkOptions,
) -> Result<(), Error>
where
    B: Backend,
    P: AsRef<StdPath>,
{
    traverse_with(backend, root, handlers.retain(|e| !e.is_directory()), options).await
}

/// Walks `root` on the local filesystem, reporting files matching `pattern`.
///
/// See [`traverse_matching_with`].
pub async fn traverse_matching<P: AsRef<StdPath>>(
    pattern: &Pattern,
    root: P,
    handlers: Handlers<'_>,
    options: &WalkOptions,
) -> Result<(), Error> {
    traverse_matching_with(&NativeFs, pattern, root, handlers, options).await
}

/// Like [`traverse_files_with`], restricted to files whose full path
/// satisfies `pattern`.
pub async fn traverse_matching_with<B, P>(
    backend: &B,
    pattern: &Pattern,
    root: P,
    handlers: Handlers<'_>,
    options: &WalkOptions,
) -> Result<(), Error>
where
    B: Backend,
    P: AsRef<StdPath>,
{
    let pattern = pattern.clone();
    let handlers = handlers.retain(move |e| pattern.matches_path(&e.path));
    traverse_files_with(backend, root, handlers, options).await
}
