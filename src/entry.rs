use std::fs::Metadata;
use std::path::Path as StdPath;
use std::path::PathBuf;
use std::time::SystemTime;

#[cfg(feature = "json_schema")]
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::errors::Error;
use crate::utils::format_system_time;
use crate::utils::parse_system_time;

/// Classification of a discovered filesystem node.
#[cfg_attr(feature = "json_schema", derive(JsonSchema))]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Hash, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    /// Anything that is not a directory.
    File,
    /// A directory.
    Directory,
}

impl Kind {
    /// Returns true for [`Kind::Directory`].
    pub fn is_directory(self) -> bool {
        self == Kind::Directory
    }
}

/// Represents the metadata of a file or directory: size, modification time,
/// and type.
#[cfg_attr(feature = "json_schema", derive(JsonSchema))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Hash, Eq)]
pub struct FileStat {
    /// The size of the file in bytes. For directories, this may be zero or
    /// implementation-defined.
    pub size: u64,
    /// The last modification time of the file or directory in RFC 3339 - Z
    /// format. For example "2018-01-26T18:30:09.453Z"
    pub mtime: String,
    /// Whether this entry is a directory.
    pub is_directory: bool,
}

impl FileStat {
    /// Create a `FileStat` from a `Metadata` value.
    ///
    /// Platforms that do not report a modification time get the unix epoch.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        FileStat {
            size: metadata.len(),
            mtime: format_system_time(modified),
            is_directory: metadata.is_dir(),
        }
    }

    /// Classification derived from the directory flag.
    pub fn kind(&self) -> Kind {
        if self.is_directory {
            Kind::Directory
        } else {
            Kind::File
        }
    }

    /// Parses [`FileStat::mtime`] back into a `SystemTime`.
    pub fn modified(&self) -> Result<SystemTime, Error> {
        parse_system_time(&self.mtime)
    }
}

/// One discovered filesystem node.
///
/// `path` is the root path as given to the traversal joined with every
/// component below it, so entries under a relative root stay relative.
#[cfg_attr(feature = "json_schema", derive(JsonSchema))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Hash, Eq)]
pub struct Entry {
    /// Path of the node.
    pub path: PathBuf,
    /// Whether the node is a file or a directory.
    pub kind: Kind,
    /// Metadata captured by the probe. Always present on per-entry callbacks;
    /// present in a [`Completion`] only when stats were requested.
    pub stat: Option<FileStat>,
}

impl Entry {
    pub(crate) fn new(path: PathBuf, stat: FileStat) -> Self {
        Self {
            path,
            kind: stat.kind(),
            stat: Some(stat),
        }
    }

    /// Returns true if the entry is a directory.
    pub fn is_directory(&self) -> bool {
        self.kind.is_directory()
    }

    /// Copy of the entry suitable for aggregation.
    pub(crate) fn aggregate(&self, with_stats: bool) -> Self {
        Self {
            path: self.path.clone(),
            kind: self.kind,
            stat: if with_stats { self.stat.clone() } else { None },
        }
    }
}

/// Bytes read for one matched file.
#[cfg_attr(feature = "json_schema", derive(JsonSchema))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Hash, Eq)]
pub struct FileContent {
    /// Path of the file that was read.
    pub path: PathBuf,
    /// Full contents of the file.
    pub bytes: Vec<u8>,
}

/// The frozen result of a finished traversal.
#[cfg_attr(feature = "json_schema", derive(JsonSchema))]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Hash, Eq)]
pub struct Completion {
    /// Every successfully discovered entry, in discovery order.
    pub entries: Vec<Entry>,
    /// File contents, in read-resolution order. Only filled by
    /// [`crate::read_matching`] when contents were requested.
    pub contents: Vec<FileContent>,
}

impl Completion {
    /// Paths of all entries, index-aligned with [`Completion::kinds`].
    pub fn paths(&self) -> Vec<&StdPath> {
        self.entries.iter().map(|e| e.path.as_path()).collect()
    }

    /// Kinds of all entries, index-aligned with [`Completion::paths`].
    pub fn kinds(&self) -> Vec<Kind> {
        self.entries.iter().map(|e| e.kind).collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was discovered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keeps only the entries `keep` accepts. Contents are left alone; the
    /// filter layers run before any file is read.
    pub(crate) fn retain<F>(mut self, mut keep: F) -> Self
    where
        F: FnMut(&Entry) -> bool,
    {
        self.entries.retain(|e| keep(e));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, kind: Kind) -> Entry {
        Entry {
            path: path.into(),
            kind,
            stat: None,
        }
    }

    #[test]
    fn paths_and_kinds_are_aligned() {
        let done = Completion {
            entries: vec![
                entry("root", Kind::Directory),
                entry("root/a.txt", Kind::File),
            ],
            contents: vec![],
        };
        assert_eq!(
            done.paths(),
            vec![StdPath::new("root"), StdPath::new("root/a.txt")]
        );
        assert_eq!(done.kinds(), vec![Kind::Directory, Kind::File]);
        assert_eq!(done.len(), 2);
    }

    #[test]
    fn retain_keeps_accepted_entries() {
        let done = Completion {
            entries: vec![
                entry("a.rs", Kind::File),
                entry("src", Kind::Directory),
                entry("b.txt", Kind::File),
            ],
            contents: Vec::new(),
        };
        let done = done.retain(|e| e.path.extension().is_some_and(|x| x == "rs"));
        assert_eq!(done.paths(), vec![StdPath::new("a.rs")]);
        assert!(done.contents.is_empty());
    }

    #[test]
    fn stat_round_trips_mtime() {
        let stat = FileStat {
            size: 3,
            mtime: "2018-01-26T18:30:09.453Z".into(),
            is_directory: false,
        };
        assert_eq!(stat.kind(), Kind::File);
        let parsed = stat.modified().unwrap();
        assert_eq!(format_system_time(parsed), stat.mtime);
    }

    #[test]
    fn aggregate_strips_stats_unless_requested() {
        let e = Entry::new(
            "x".into(),
            FileStat {
                size: 0,
                mtime: "2018-01-26T18:30:09.453Z".into(),
                is_directory: true,
            },
        );
        assert!(e.is_directory());
        assert!(e.aggregate(false).stat.is_none());
        assert!(e.aggregate(true).stat.is_some());
    }

    #[test]
    fn kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Kind::Directory).unwrap(),
            "\"directory\""
        );
    }
}
