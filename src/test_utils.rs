use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::fs::create_dir_all;
use std::future::Future;
use std::path::Path as StdPath;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::SystemTime;

use async_walkdir::WalkDir;
use futures_lite::StreamExt;
use similar::ChangeTag;
use similar::TextDiff;
use tempdir::TempDir;

use crate::Entry;
use crate::Error;
use crate::FileStat;
use crate::Kind;
use crate::backend::Backend;
use crate::utils::format_system_time;

/// A fixture row: relative path, contents, is directory.
pub type Fixture = [(&'static str, &'static str, bool)];

// File paths and optional contents to create in the temporary test
pub(crate) static TEMP_FILES: &Fixture = &[
    ("file1.txt", "file1", false),
    ("file2.txt", "file2", false),
    ("dir1", "", true),
    ("dir1/file3.txt", "file3", false),
    ("dir1/dir2", "", true),
    ("dir1/dir2/file4.txt", "file4", false),
    ("dir1/dir2/dir_empty1", "", true),
    ("dir3", "", true),
    ("dir3/file6.txt", "file6", false),
];

/// Six entries counting the root: two directories, four files.
pub static EACH_FILE_OR_DIRECTORY: &Fixture = &[
    ("a.txt", "a", false),
    ("b.txt", "b", false),
    ("sub/c.txt", "c", false),
    ("sub/d.txt", "d", false),
];

/// Eleven entries counting the root, five of them `_test.js` files.
pub static FILE_MATCHING: &Fixture = &[
    ("a_test.js", "assert(1)", false),
    ("b_test.js", "assert(2)", false),
    ("helper.js", "module.exports = {}", false),
    ("README.md", "# fixtures", false),
    ("lib/c_test.js", "assert(3)", false),
    ("lib/util.js", "exports.x = 1", false),
    ("lib/nested/d_test.js", "assert(4)", false),
    ("lib/nested/e_test.js", "assert(5)", false),
];

/// Utility structure for managing a temporary test directory and its files.
#[derive(Debug)]
pub struct TestRoot {
    /// Root of the temporary test directory.
    pub root: TempDir,
    /// Every node below the root, keyed by path relative to the root.
    pub files: BTreeMap<PathBuf, Kind>,

    save_path: Option<PathBuf>,
}

impl TestRoot {
    /// Creates a new `TestRoot` populated with the default fixture.
    pub async fn new(save_path: Option<&str>) -> Result<Self, Error> {
        Self::from_fixture(TEMP_FILES, save_path).await
    }

    /// Creates a new `TestRoot` populated with `fixture`. Parents of listed
    /// files are created as needed; an empty fixture leaves an empty root.
    pub async fn from_fixture(fixture: &Fixture, save_path: Option<&str>) -> Result<Self, Error> {
        let root = TempDir::new("fanwalk").map_err(|e| Error::InvalidArgument(format!(
            "temporary directory: {e}"
        )))?;
        let mut ret = Self {
            root,
            files: BTreeMap::new(),
            save_path: save_path.map(|p| StdPath::new("/tmp/").join(p)),
        };
        for (relative_path, contents, is_dir) in fixture {
            if *is_dir {
                ret.create_dir(relative_path)?;
            } else {
                ret.create_file(relative_path, contents)?;
            }
        }
        ret.reload_files().await?;
        Ok(ret)
    }

    /// Path of the temporary root.
    pub fn path(&self) -> &StdPath {
        self.root.path()
    }

    /// Number of nodes a traversal of the root reports, the root included.
    pub fn node_count(&self) -> usize {
        self.files.len() + 1
    }

    /// Number of files below the root.
    pub fn file_count(&self) -> usize {
        self.files.values().filter(|k| **k == Kind::File).count()
    }

    /// Kind of the node at `path`, an absolute path under the root.
    pub fn kind_of(&self, path: &StdPath) -> Option<Kind> {
        if path == self.path() {
            return Some(Kind::Directory);
        }
        let relative = path.strip_prefix(self.path()).ok()?;
        self.files.get(relative).copied()
    }

    /// Creates a directory (and its parents) under the root.
    pub fn create_dir(&mut self, relative_path: &str) -> Result<(), Error> {
        let full_path = self.root.path().join(relative_path);
        create_dir_all(&full_path).map_err(|e| Error::InvalidArgument(format!(
            "directory {}: {e}",
            full_path.display()
        )))
    }

    /// Creates a new file with the specified relative path and content in the
    /// temporary test directory.
    pub fn create_file(&mut self, relative_path: &str, content: &str) -> Result<(), Error> {
        let full_path = self.root.path().join(relative_path);
        if let Some(parent) = full_path.parent() {
            create_dir_all(parent).map_err(|e| Error::InvalidArgument(format!(
                "directory {}: {e}",
                parent.display()
            )))?;
        }
        fs::write(&full_path, content).map_err(|e| Error::InvalidArgument(format!(
            "file {}: {e}",
            full_path.display()
        )))
    }

    /// Rebuilds [`TestRoot::files`] from disk.
    pub async fn reload_files(&mut self) -> Result<(), Error> {
        let mut new_files = BTreeMap::new();
        let mut entries = WalkDir::new(self.root.path());
        loop {
            match entries.next().await {
                Some(Ok(entry)) => {
                    let path = entry.path();
                    let kind = match entry.file_type().await {
                        Ok(t) if t.is_dir() => Kind::Directory,
                        Ok(_) => Kind::File,
                        Err(e) => return Err(Error::probe(&path, e)),
                    };
                    let relative = path
                        .strip_prefix(self.root.path())
                        .map_err(|e| Error::InvalidArgument(format!("strip_prefix: {e}")))?
                        .to_path_buf();
                    new_files.insert(relative, kind);
                }
                Some(Err(e)) => {
                    return Err(Error::ListDir {
                        what: self.root.path().display().to_string(),
                        how: e.to_string(),
                    });
                }
                None => break,
            }
        }
        self.files = new_files;
        Ok(())
    }

    fn listing<'a, I>(&self, rows: I) -> String
    where
        I: Iterator<Item = (&'a StdPath, Kind)>,
    {
        let mut lines: Vec<String> = rows
            .map(|(path, kind)| {
                let shown = if path.as_os_str().is_empty() {
                    ".".to_string()
                } else {
                    path.display().to_string()
                };
                let tag = if kind.is_directory() { "DIR" } else { "FILE" };
                format!("{tag}\t{shown}\n")
            })
            .collect();
        lines.sort();
        lines.concat()
    }

    /// Returns none if `entries` lists exactly the nodes on disk (root
    /// included), or a diff of the two listings otherwise.
    pub fn compare(&self, entries: &[Entry]) -> Result<Option<String>, Error> {
        let mut incoming = Vec::with_capacity(entries.len());
        for entry in entries {
            let relative = entry.path.strip_prefix(self.path()).map_err(|e| {
                Error::InvalidArgument(format!("{}: {e}", entry.path.display()))
            })?;
            incoming.push((relative, entry.kind));
        }
        let on_disk = self
            .files
            .iter()
            .map(|(p, k)| (p.as_path(), *k))
            .chain(std::iter::once((StdPath::new(""), Kind::Directory)));

        let self_buf = self.listing(on_disk);
        let other_buf = self.listing(incoming.into_iter());
        let diff = TextDiff::from_lines(&self_buf, &other_buf);
        let mut diffs = String::new();
        for change in diff.iter_all_changes() {
            let sign = match change.tag() {
                ChangeTag::Delete => "-",
                ChangeTag::Insert => "+",
                ChangeTag::Equal => continue,
            };

            diffs.push_str(&format!("{}{}", sign, change));
        }
        if diffs.is_empty() {
            Ok(None)
        } else {
            Ok(Some(diffs))
        }
    }

    fn copy_dir_all(src: impl AsRef<StdPath>, dst: impl AsRef<StdPath>) -> std::io::Result<()> {
        create_dir_all(&dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            let ty = entry.file_type()?;
            if ty.is_dir() {
                Self::copy_dir_all(entry.path(), dst.as_ref().join(entry.file_name()))?;
            } else {
                fs::copy(entry.path(), dst.as_ref().join(entry.file_name()))?;
            }
        }
        Ok(())
    }
}

impl Drop for TestRoot {
    fn drop(&mut self) {
        if let Some(save_path) = &self.save_path {
            let _ = Self::copy_dir_all(self.root.path(), save_path);
            println!("TestRoot preserved at {}", save_path.to_string_lossy());
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum OpKind {
    Probe,
    Expand,
    Read,
}

#[derive(Debug, Default)]
struct Script {
    nodes: BTreeMap<PathBuf, Node>,
    delays: HashMap<(PathBuf, OpKind), Duration>,
    failures: HashSet<(PathBuf, OpKind)>,
    latency: Duration,
}

#[derive(Debug, Default)]
struct Inner {
    script: Mutex<Script>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// An in-memory [`Backend`] with scripted latency and failures.
///
/// Clones share the same tree. Parents of added nodes are created
/// implicitly.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    inner: Arc<Inner>,
}

struct InFlight<'a>(&'a Inner);

impl<'a> InFlight<'a> {
    fn enter(inner: &'a Inner) -> Self {
        let now = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        inner.peak.fetch_max(now, Ordering::SeqCst);
        Self(inner)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryFs {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.inner
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, path: &StdPath, node: Node) {
        let mut script = self.script();
        let mut parent = path.parent();
        while let Some(p) = parent.filter(|p| !p.as_os_str().is_empty()) {
            script.nodes.entry(p.to_path_buf()).or_insert(Node::Dir);
            parent = p.parent();
        }
        script.nodes.insert(path.to_path_buf(), node);
    }

    /// Adds a directory.
    pub fn add_dir(&self, path: &str) {
        self.insert(StdPath::new(path), Node::Dir);
    }

    /// Adds a file with `content`.
    pub fn add_file(&self, path: &str, content: &str) {
        self.insert(StdPath::new(path), Node::File(content.as_bytes().to_vec()));
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.script().nodes.len()
    }

    /// Latency applied to every operation without a specific delay.
    pub fn set_latency(&self, latency: Duration) {
        self.script().latency = latency;
    }

    /// Delays probes of `path`.
    pub fn delay_probe(&self, path: &str, delay: Duration) {
        self.script().delays.insert((path.into(), OpKind::Probe), delay);
    }

    /// Delays listings of `path`.
    pub fn delay_expand(&self, path: &str, delay: Duration) {
        self.script().delays.insert((path.into(), OpKind::Expand), delay);
    }

    /// Delays reads of `path`.
    pub fn delay_read(&self, path: &str, delay: Duration) {
        self.script().delays.insert((path.into(), OpKind::Read), delay);
    }

    /// Makes probes of `path` fail as inaccessible.
    pub fn fail_probe(&self, path: &str) {
        self.script().failures.insert((path.into(), OpKind::Probe));
    }

    /// Makes listings of `path` fail.
    pub fn fail_expand(&self, path: &str) {
        self.script().failures.insert((path.into(), OpKind::Expand));
    }

    /// Makes reads of `path` fail.
    pub fn fail_read(&self, path: &str) {
        self.script().failures.insert((path.into(), OpKind::Read));
    }

    /// Highest number of operations observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    /// Runs `op` on `path` after its scripted delay. Returns `Ok(None)` for a
    /// scripted failure.
    async fn run<T, F>(&self, path: &StdPath, op: OpKind, f: F) -> Option<T>
    where
        F: FnOnce(&Script) -> T,
    {
        let _guard = InFlight::enter(&self.inner);
        let delay = {
            let script = self.script();
            script
                .delays
                .get(&(path.to_path_buf(), op))
                .copied()
                .unwrap_or(script.latency)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        let script = self.script();
        if script.failures.contains(&(path.to_path_buf(), op)) {
            return None;
        }
        Some(f(&script))
    }
}

impl Backend for MemoryFs {
    fn probe(&self, path: PathBuf) -> impl Future<Output = Result<FileStat, Error>> + Send {
        let this = self.clone();
        async move {
            let found = this
                .run(&path, OpKind::Probe, |s| s.nodes.get(&path).cloned())
                .await;
            let what = path.to_string_lossy().to_string();
            match found {
                None => Err(Error::Inaccessible {
                    what,
                    how: "scripted failure".into(),
                }),
                Some(None) => Err(Error::NotFound { what }),
                Some(Some(node)) => Ok(FileStat {
                    size: match &node {
                        Node::Dir => 0,
                        Node::File(bytes) => bytes.len() as u64,
                    },
                    mtime: format_system_time(SystemTime::UNIX_EPOCH),
                    is_directory: matches!(node, Node::Dir),
                }),
            }
        }
    }

    fn expand(
        &self,
        path: PathBuf,
    ) -> impl Future<Output = Result<Vec<OsString>, Error>> + Send {
        let this = self.clone();
        async move {
            let listed = this
                .run(&path, OpKind::Expand, |s| match s.nodes.get(&path) {
                    Some(Node::Dir) => Some(
                        s.nodes
                            .keys()
                            .filter(|p| p.parent() == Some(path.as_path()))
                            .filter_map(|p| p.file_name().map(|n| n.to_os_string()))
                            .collect::<Vec<_>>(),
                    ),
                    _ => None,
                })
                .await;
            match listed {
                Some(Some(mut names)) => {
                    names.sort();
                    Ok(names)
                }
                Some(None) => Err(Error::ListDir {
                    what: path.to_string_lossy().to_string(),
                    how: "not a directory".into(),
                }),
                None => Err(Error::ListDir {
                    what: path.to_string_lossy().to_string(),
                    how: "scripted failure".into(),
                }),
            }
        }
    }

    fn read(&self, path: PathBuf) -> impl Future<Output = Result<Vec<u8>, Error>> + Send {
        let this = self.clone();
        async move {
            let read = this
                .run(&path, OpKind::Read, |s| match s.nodes.get(&path) {
                    Some(Node::File(bytes)) => Some(bytes.clone()),
                    _ => None,
                })
                .await;
            read.flatten().ok_or_else(|| Error::Read {
                what: path.to_string_lossy().to_string(),
                how: "scripted failure".into(),
            })
        }
    }
}
