//! The traversal core.
//!
//! One driver future owns all traversal state. Probes and expansions run as
//! tasks in a [`JoinSet`] and report back to the driver, which records
//! entries, invokes callbacks and issues follow-up work. Work discovered by an
//! operation is issued before that operation is resolved, so the outstanding
//! count only reaches zero once nothing is left to do.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::Path as StdPath;
use std::path::PathBuf;

use log::debug;
use log::trace;
use tokio::task::JoinSet;

use crate::Completion;
use crate::Entry;
use crate::Error;
use crate::FileStat;
use crate::WalkOptions;
use crate::backend::Backend;
use crate::native_fs::NativeFs;
use crate::utils::root_or_current;

/// Per-entry callback. Receives each discovered entry or a branch error.
pub type EntryHandler<'a> = Box<dyn FnMut(Result<&Entry, &Error>) + 'a>;

/// Completion callback. Called at most once per traversal.
pub type CompleteHandler<'a> = Box<dyn FnOnce(Result<Completion, Error>) + 'a>;

/// The pair of optional callbacks a traversal reports through.
///
/// At least one must be set. Without a completion handler nothing is
/// aggregated. Without an entry handler, the first branch error is delivered
/// to the completion handler and ends the traversal.
#[derive(Default)]
pub struct Handlers<'a> {
    pub(crate) on_entry: Option<EntryHandler<'a>>,
    pub(crate) on_complete: Option<CompleteHandler<'a>>,
}

impl<'a> Handlers<'a> {
    /// No handlers yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-entry callback.
    pub fn on_entry<F>(mut self, f: F) -> Self
    where
        F: FnMut(Result<&Entry, &Error>) + 'a,
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

    pub(crate) fn check(&self) -> Result<(), Error> {
        if self.on_entry.is_none() && self.on_complete.is_none() {
            return Err(Error::InvalidArgument(
                "traversal needs an entry or a completion handler".into(),
            ));
        }
        Ok(())
    }

    /// Wraps both callbacks so that only entries accepted by `keep` reach
    /// them. Errors always pass.
    pub(crate) fn retain<K>(self, keep: K) -> Handlers<'a>
    where
        K: Fn(&Entry) -> bool + Clone + 'a,
    {
        let Handlers {
            on_entry,
            on_complete,
        } = self;
        let mut out = Handlers::new();
        if let Some(mut f) = on_entry {
            let keep = keep.clone();
            out = out.on_entry(move |ev| match ev {
                Ok(entry) if !keep(entry) => {}
                ev => f(ev),
            });
        }
        if let Some(f) = on_complete {
            out = out.on_complete(move |res| f(res.map(|done| done.retain(|e| keep(e)))));
        }
        out
    }
}

enum Op {
    Probe(PathBuf),
    Expand(PathBuf),
}

enum Outcome {
    Probed(PathBuf, Result<FileStat, Error>),
    Expanded(PathBuf, Result<Vec<OsString>, Error>),
    Lost(Error),
}

struct TraversalState<B> {
    backend: B,
    // Issued but unresolved operations, queued ones included.
    outstanding: usize,
    running: JoinSet<Outcome>,
    queued: VecDeque<Op>,
    limit: usize,
    discovered: Option<Vec<Entry>>,
    with_stats: bool,
}

impl<B: Backend> TraversalState<B> {
    fn new(backend: B, options: &WalkOptions, aggregate: bool) -> Self {
        Self {
            backend,
            outstanding: 0,
            running: JoinSet::new(),
            queued: VecDeque::new(),
            limit: options.max_in_flight.map_or(usize::MAX, |n| n.get()),
            discovered: aggregate.then(Vec::new),
            with_stats: options.with_stats,
        }
    }

    fn issue(&mut self, op: Op) {
        self.outstanding += 1;
        if self.running.len() < self.limit {
            self.spawn(op);
        } else {
            self.queued.push_back(op);
        }
    }

    fn resolve(&mut self) {
        debug_assert!(self.outstanding > 0, "resolved more work than was issued");
        self.outstanding -= 1;
        while self.running.len() < self.limit {
            let Some(op) = self.queued.pop_front() else {
                break;
            };
            self.spawn(op);
        }
    }

    fn spawn(&mut self, op: Op) {
        let backend = self.backend.clone();
        match op {
            Op::Probe(path) => {
                self.running.spawn(async move {
                    let res = backend.probe(path.clone()).await;
                    Outcome::Probed(path, res)
                });
            }
            Op::Expand(path) => {
                self.running.spawn(async move {
                    let res = backend.expand(path.clone()).await;
                    Outcome::Expanded(path, res)
                });
            }
        }
    }

    /// Waits for the next operation to resolve. Returns `None` once no work
    /// is outstanding.
    async fn next(&mut self) -> Option<Outcome> {
        if self.outstanding == 0 {
            return None;
        }
        match self.running.join_next().await {
            Some(Ok(outcome)) => Some(outcome),
            Some(Err(e)) => Some(Outcome::Lost(Error::Sync {
                what: "traversal task".into(),
                how: e.to_string(),
            })),
            None => {
                debug_assert!(false, "outstanding work with nothing running");
                None
            }
        }
    }

    fn record(&mut self, entry: &Entry) {
        if let Some(discovered) = self.discovered.as_mut() {
            discovered.push(entry.aggregate(self.with_stats));
        }
    }

    fn freeze(self) -> Completion {
        Completion {
            entries: self.discovered.unwrap_or_default(),
            contents: Vec::new(),
        }
    }
}

/// Walks everything under `root` on the local filesystem, `root` included.
///
/// See [`traverse_with`].
pub async fn traverse<P: AsRef<StdPath>>(
    root: P,
    handlers: Handlers<'_>,
    options: &WalkOptions,
) -> Result<(), Error> {
    traverse_with(&NativeFs, root, handlers, options).await
}

/// Walks everything under `root`, `root` included, using `backend`.
///
/// The entry handler sees each entry as its probe resolves; a directory is
/// always reported before its children. Failures are reported per branch and
/// never stop sibling branches. The completion handler runs once, after all
/// work has resolved, with every discovered entry in discovery order.
///
/// Returns [`Error::InvalidArgument`] without touching the filesystem when
/// `handlers` is empty; every other failure goes through the handlers.
pub async fn traverse_with<B, P>(
    backend: &B,
    root: P,
    handlers: Handlers<'_>,
    options: &WalkOptions,
) -> Result<(), Error>
where
    B: Backend,
    P: AsRef<StdPath>,
{
    handlers.check()?;
    let Handlers {
        mut on_entry,
        mut on_complete,
    } = handlers;

    let root = root_or_current(root);
    debug!("traversing {}", root.display());
    let mut state = TraversalState::new(backend.clone(), options, on_complete.is_some());
    state.issue(Op::Probe(root));

    let mut found = 0usize;
    let mut failed = 0usize;
    while let Some(outcome) = state.next().await {
        let failure = match outcome {
            Outcome::Probed(path, Ok(stat)) => {
                let entry = Entry::new(path, stat);
                found += 1;
                state.record(&entry);
                if let Some(f) = on_entry.as_mut() {
                    f(Ok(&entry));
                }
                if entry.is_directory() {
                    state.issue(Op::Expand(entry.path));
                }
                None
            }
            Outcome::Expanded(path, Ok(names)) => {
                trace!("{} has {} children", path.display(), names.len());
                for name in names {
                    state.issue(Op::Probe(path.join(name)));
                }
                None
            }
            Outcome::Probed(_, Err(e)) | Outcome::Expanded(_, Err(e)) | Outcome::Lost(e) => {
                Some(e)
            }
        };
        state.resolve();

        let Some(e) = failure else {
            continue;
        };
        failed += 1;
        debug!("branch failed: {e}");
        match on_entry.as_mut() {
            Some(f) => f(Err(&e)),
            None => {
                if let Some(done) = on_complete.take() {
                    done(Err(e));
                }
                return Ok(());
            }
        }
    }

    debug!("traversal finished: {found} entries, {failed} errors");
    if let Some(done) = on_complete.take() {
        done(Ok(state.freeze()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::cell::RefCell;
    use std::num::NonZeroUsize;
    use std::time::Duration;

    use super::*;
    use crate::Kind;
    use crate::MemoryFs;
    use crate::TestRoot;
    use crate::test_utils::EACH_FILE_OR_DIRECTORY;
    use crate::test_utils::FILE_MATCHING;

    struct Run {
        entries: Vec<Entry>,
        errors: Vec<Error>,
        completions: usize,
        done: Option<Result<Completion, Error>>,
    }

    async fn run_with<B: Backend>(backend: &B, root: &StdPath, options: &WalkOptions) -> Run {
        let mut entries = Vec::new();
        let mut errors = Vec::new();
        let completions = Cell::new(0);
        let mut done = None;
        let handlers = Handlers::new()
            .on_entry(|ev| match ev {
                Ok(entry) => entries.push(entry.clone()),
                Err(e) => errors.push(e.clone()),
            })
            .on_complete(|res| {
                completions.set(completions.get() + 1);
                done = Some(res);
            });
        traverse_with(backend, root, handlers, options).await.unwrap();
        Run {
            entries,
            errors,
            completions: completions.get(),
            done,
        }
    }

    #[tokio::test]
    async fn reports_every_node_once() {
        let root = TestRoot::from_fixture(EACH_FILE_OR_DIRECTORY, None)
            .await
            .unwrap();
        let run = run_with(&NativeFs, root.path(), &WalkOptions::new()).await;

        assert!(run.errors.is_empty());
        assert_eq!(run.entries.len(), 6);
        assert_eq!(run.entries.len(), root.node_count());
        assert_eq!(run.completions, 1);

        let done = run.done.unwrap().unwrap();
        assert_eq!(done.len(), 6);
        assert_eq!(done.paths().len(), done.kinds().len());
        assert_eq!(root.compare(&done.entries).unwrap(), None);
    }

    #[tokio::test]
    async fn completion_matches_entry_stream() {
        let root = TestRoot::from_fixture(FILE_MATCHING, None).await.unwrap();
        let run = run_with(&NativeFs, root.path(), &WalkOptions::new()).await;

        assert_eq!(run.entries.len(), 11);
        let done = run.done.unwrap().unwrap();
        let streamed: Vec<_> = run.entries.iter().map(|e| e.path.as_path()).collect();
        assert_eq!(done.paths(), streamed);
        for entry in &done.entries {
            assert_eq!(root.kind_of(&entry.path), Some(entry.kind));
            assert!(entry.stat.is_none());
        }
    }

    #[tokio::test]
    async fn directory_precedes_its_children() {
        let root = TestRoot::new(None).await.unwrap();
        let run = run_with(&NativeFs, root.path(), &WalkOptions::new()).await;

        let position = |p: &StdPath| run.entries.iter().position(|e| e.path == p).unwrap();
        for (i, entry) in run.entries.iter().enumerate() {
            if let Some(parent) = entry.path.parent().filter(|_| entry.path != root.path()) {
                assert!(position(parent) < i, "{} before parent", entry.path.display());
            }
        }
        assert_eq!(run.entries[0].path, root.path());
    }

    #[tokio::test]
    async fn empty_directory_reports_itself() {
        let root = TestRoot::from_fixture(&[], None).await.unwrap();
        let run = run_with(&NativeFs, root.path(), &WalkOptions::new()).await;

        assert_eq!(run.entries.len(), 1);
        assert_eq!(run.entries[0].kind, Kind::Directory);
        assert_eq!(run.completions, 1);
        assert_eq!(run.done.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_root_reports_only_an_error() {
        let root = TestRoot::new(None).await.unwrap();
        let run = run_with(&NativeFs, &root.path().join("missing-path"), &WalkOptions::new()).await;

        assert!(run.entries.is_empty());
        assert_eq!(run.errors.len(), 1);
        assert!(matches!(run.errors[0], Error::NotFound { .. }));
        assert_eq!(run.completions, 1);
        assert!(run.done.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_file_root() {
        let root = TestRoot::new(None).await.unwrap();
        let run = run_with(&NativeFs, &root.path().join("file1.txt"), &WalkOptions::new()).await;

        assert_eq!(run.entries.len(), 1);
        assert_eq!(run.entries[0].kind, Kind::File);
    }

    #[tokio::test]
    async fn stats_are_aggregated_on_request() {
        let root = TestRoot::new(None).await.unwrap();
        let run = run_with(&NativeFs, root.path(), &WalkOptions::new().with_stats(true)).await;

        let done = run.done.unwrap().unwrap();
        assert_eq!(done.len(), root.node_count());
        for entry in &done.entries {
            let stat = entry.stat.as_ref().unwrap();
            assert_eq!(stat.kind(), entry.kind);
            assert!(stat.modified().is_ok());
        }
    }

    #[tokio::test]
    async fn entry_handler_only() {
        let root = TestRoot::new(None).await.unwrap();
        let mut seen = 0;
        let handlers = Handlers::new().on_entry(|ev| {
            ev.unwrap();
            seen += 1;
        });
        traverse(root.path(), handlers, &WalkOptions::new())
            .await
            .unwrap();
        assert_eq!(seen, root.node_count());
    }

    #[tokio::test]
    async fn no_handlers_is_rejected() {
        let err = traverse("missing-path", Handlers::new(), &WalkOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn error_without_entry_handler_goes_to_completion() {
        let mut done = None;
        let handlers = Handlers::new().on_complete(|res| done = Some(res));
        traverse("missing-path", handlers, &WalkOptions::new())
            .await
            .unwrap();
        assert!(matches!(done, Some(Err(Error::NotFound { .. }))));
    }

    #[tokio::test]
    async fn slow_expansion_is_not_missed() {
        // "fast" drains completely while "slow" is still being listed, so the
        // amount of finished work catches up with the issued work in between.
        let fs = MemoryFs::new();
        fs.add_dir("m");
        fs.add_file("m/fast/a", "a");
        fs.add_file("m/fast/b", "b");
        fs.add_file("m/slow/deep/c", "c");
        fs.add_file("m/slow/d", "d");
        fs.delay_expand("m/slow", Duration::from_millis(50));
        fs.delay_probe("m/slow/deep", Duration::from_millis(20));

        let run = run_with(&fs, StdPath::new("m"), &WalkOptions::new()).await;

        assert!(run.errors.is_empty());
        assert_eq!(run.completions, 1);
        let done = run.done.unwrap().unwrap();
        assert_eq!(done.len(), fs.node_count());
        assert!(done.paths().contains(&StdPath::new("m/slow/deep/c")));
    }

    #[tokio::test]
    async fn failing_branch_is_isolated() {
        let fs = MemoryFs::new();
        fs.add_file("m/ok1/a", "a");
        fs.add_file("m/ok2/b", "b");
        fs.add_file("m/bad/hidden", "x");
        fs.add_file("m/c", "c");
        fs.fail_expand("m/bad");

        let run = run_with(&fs, StdPath::new("m"), &WalkOptions::new()).await;

        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].subject(), Some("m/bad"));
        assert!(matches!(run.errors[0], Error::ListDir { .. }));
        assert_eq!(run.completions, 1);

        let done = run.done.unwrap().unwrap();
        // Everything except m/bad/hidden.
        assert_eq!(done.len(), fs.node_count() - 1);
        assert!(done.paths().contains(&StdPath::new("m/bad")));
        assert!(!done.paths().contains(&StdPath::new("m/bad/hidden")));
    }

    #[tokio::test]
    async fn failing_probe_is_isolated() {
        let fs = MemoryFs::new();
        fs.add_file("m/a", "a");
        fs.add_file("m/b", "b");
        fs.add_file("m/sub/c", "c");
        fs.fail_probe("m/b");

        let run = run_with(&fs, StdPath::new("m"), &WalkOptions::new()).await;

        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].subject(), Some("m/b"));
        assert_eq!(run.entries.len(), fs.node_count() - 1);
        assert_eq!(run.completions, 1);
    }

    #[tokio::test]
    async fn concurrency_cap_is_respected() {
        let fs = MemoryFs::new();
        for i in 0..20 {
            fs.add_file(&format!("m/d{}/f{}", i % 4, i), "x");
        }
        fs.set_latency(Duration::from_millis(2));

        let opts = WalkOptions::new().max_in_flight(NonZeroUsize::new(3).unwrap());
        let run = run_with(&fs, StdPath::new("m"), &opts).await;

        assert!(run.errors.is_empty());
        assert_eq!(run.entries.len(), fs.node_count());
        assert!(fs.peak_in_flight() <= 3);
        assert!(fs.peak_in_flight() >= 2);
    }

    #[tokio::test]
    async fn unbounded_walk_fans_out() {
        let fs = MemoryFs::new();
        for i in 0..10 {
            fs.add_file(&format!("m/f{i}"), "x");
        }
        fs.set_latency(Duration::from_millis(5));

        let run = run_with(&fs, StdPath::new("m"), &WalkOptions::new()).await;

        assert_eq!(run.entries.len(), 11);
        assert!(fs.peak_in_flight() >= 10);
    }

    #[tokio::test]
    async fn callbacks_may_share_state() {
        let fs = MemoryFs::new();
        fs.add_file("m/a", "a");
        let log = RefCell::new(Vec::new());
        let handlers = Handlers::new()
            .on_entry(|ev| log.borrow_mut().push(ev.unwrap().path.clone()))
            .on_complete(|res| {
                assert_eq!(res.unwrap().len(), log.borrow().len());
                log.borrow_mut().push(PathBuf::from("<done>"));
            });
        traverse_with(&fs, "m", handlers, &WalkOptions::new())
            .await
            .unwrap();
        assert_eq!(log.into_inner().last(), Some(&PathBuf::from("<done>")));
    }
}
