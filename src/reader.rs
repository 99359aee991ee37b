//! Content layer: reads every file the pattern layer lets through.

use std::path::Path as StdPath;

use log::debug;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinSet;

use crate::Completion;
use crate::Entry;
use crate::Error;
use crate::FileContent;
use crate::Handlers;
use crate::Pattern;
use crate::WalkOptions;
use crate::backend::Backend;
use crate::backend::Throttled;
use crate::filter::traverse_matching_with;
use crate::native_fs::NativeFs;

/// Per-file callback of the content layer. Receives each matched file with
/// its bytes, or an error.
pub type ReadHandler<'a> = Box<dyn FnMut(Result<(&Entry, &[u8]), &Error>) + 'a>;

/// Completion callback of the content layer.
pub type ReadCompleteHandler<'a> = Box<dyn FnOnce(Result<Completion, Error>) + 'a>;

/// Callbacks for [`read_matching`]. Same rules as [`Handlers`].
#[derive(Default)]
pub struct ReadHandlers<'a> {
    on_entry: Option<ReadHandler<'a>>,
    on_complete: Option<ReadCompleteHandler<'a>>,
}

impl<'a> ReadHandlers<'a> {
    /// No handlers yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-file callback.
    pub fn on_entry<F>(mut self, f: F) -> Self
    where
        F: FnMut(Result<(&Entry, &[u8]), &Error>) + 'a,
    {
        self.on_entry = Some(Box::new(f));
        self
    }

    /// Sets the completion callback.
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Result<Completion, Error>) + 'a,
    {
        self.on_complete = Some(Box::new(f));
        self
    }
}

/// Reads every file under `root` on the local filesystem whose path matches
/// `pattern`.
///
/// See [`read_matching_with`].
pub async fn read_matching<P: AsRef<StdPath>>(
    pattern: &Pattern,
    root: P,
    handlers: ReadHandlers<'_>,
    options: &WalkOptions,
) -> Result<(), Error> {
    read_matching_with(&NativeFs, pattern, root, handlers, options).await
}

/// Like [`traverse_matching_with`], but each matched file is read before it
/// is reported.
///
/// Reads run concurrently with the walk and share its
/// [`WalkOptions::max_in_flight`] budget. A failed read is reported as
/// [`Error::Read`] for that file; the file stays in the completion's entries
/// but contributes nothing to its contents. The completion handler runs
/// after the walk has finished and every read has resolved; contents are
/// only collected when [`WalkOptions::with_content`] is set.
///
/// Without an entry handler the first error ends the call: it goes to the
/// completion handler and the rest of the walk and the pending reads are
/// abandoned.
pub async fn read_matching_with<B, P>(
    backend: &B,
    pattern: &Pattern,
    root: P,
    handlers: ReadHandlers<'_>,
    options: &WalkOptions,
) -> Result<(), Error>
where
    B: Backend,
    P: AsRef<StdPath>,
{
    let ReadHandlers {
        mut on_entry,
        mut on_complete,
    } = handlers;
    if on_entry.is_none() && on_complete.is_none() {
        return Err(Error::InvalidArgument(
            "read needs an entry or a completion handler".into(),
        ));
    }

    let backend = Throttled::new(backend.clone(), options.max_in_flight);
    let (tx, mut rx) = mpsc::unbounded_channel::<Result<Entry, Error>>();
    let (done_tx, done_rx) = oneshot::channel();
    let mut upstream = Handlers::new().on_entry(move |ev| {
        // The receiver only goes away once a terminal error was delivered.
        let _ = tx.send(ev.map(Entry::clone).map_err(Error::clone));
    });
    if on_complete.is_some() {
        upstream = upstream.on_complete(move |res| {
            let _ = done_tx.send(res);
        });
    }
    let walk = traverse_matching_with(&backend, pattern, root, upstream, options);
    tokio::pin!(walk);

    let collect = options.with_content && on_complete.is_some();
    let mut reads = JoinSet::new();
    let mut contents = Vec::new();
    let mut walked = None;
    // Stays open until the finished walk has dropped its sender.
    let mut receiving = true;
    loop {
        let failure = tokio::select! {
            res = &mut walk, if walked.is_none() => {
                walked = Some(res);
                None
            }
            ev = rx.recv(), if receiving => match ev {
                Some(Ok(entry)) => {
                    let backend = backend.clone();
                    reads.spawn(async move {
                        let res = backend.read(entry.path.clone()).await;
                        (entry, res)
                    });
                    None
                }
                Some(Err(e)) => Some(e),
                None => {
                    receiving = false;
                    None
                }
            },
            Some(joined) = reads.join_next(), if !reads.is_empty() => match joined {
                Ok((entry, Ok(bytes))) => {
                    if let Some(f) = on_entry.as_mut() {
                        f(Ok((&entry, bytes.as_slice())));
                    }
                    if collect {
                        contents.push(FileContent {
                            path: entry.path,
                            bytes,
                        });
                    }
                    None
                }
                Ok((_, Err(e))) => Some(e),
                Err(e) => Some(Error::Sync {
                    what: "read task".into(),
                    how: e.to_string(),
                }),
            },
            else => break,
        };

        let Some(e) = failure else {
            continue;
        };
        debug!("read branch failed: {e}");
        match on_entry.as_mut() {
            Some(f) => f(Err(&e)),
            None => {
                if let Some(done) = on_complete.take() {
                    done(Err(e));
                }
                // Returning drops the walk and the read set, which aborts
                // everything still in flight.
                return Ok(());
            }
        }
    }
    if let Some(walked) = walked {
        walked?;
    }

    if let Some(done) = on_complete.take() {
        let res = done_rx.await.unwrap_or_else(|e| {
            Err(Error::Sync {
                what: "walk completion".into(),
                how: e.to_string(),
            })
        });
        done(res.map(|mut completion| {
            completion.contents = contents;
            completion
        }));
    }
    Ok(())
}
