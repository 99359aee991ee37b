//! Concurrent, fan-out filesystem traversal with a race-free completion
//! signal.
//!
//! A traversal probes the root, lists every directory it finds and probes
//! every child, with all of those operations in flight at once. Each
//! discovered entry is reported as soon as its probe resolves, and a single
//! completion callback runs once nothing is left in flight.
//!
//! Three layers narrow the stream: [`traverse_files`] drops directories,
//! [`traverse_matching`] keeps files matching a [`Pattern`], and
//! [`read_matching`] also delivers each matched file's bytes.
//!
//! ```rust
//! # tokio_test::block_on(async {
//! # use std::path::PathBuf;
//! use fanwalk::{traverse_matching, Handlers, Pattern, WalkOptions};
//!
//! let pattern = Pattern::regex(r"\.rs$").unwrap();
//! let mut found = Vec::new();
//! let mut total = None;
//! let handlers = Handlers::new()
//!     .on_entry(|ev| match ev {
//!         Ok(entry) => found.push(entry.path.clone()),
//!         Err(e) => eprintln!("skipped: {e}"),
//!     })
//!     .on_complete(|done| total = done.ok().map(|d| d.len()));
//! traverse_matching(&pattern, "src", handlers, &WalkOptions::new())
//!     .await
//!     .unwrap();
//!
//! assert!(found.contains(&PathBuf::from("src/lib.rs")));
//! assert_eq!(total, Some(found.len()));
//! # })
//! ```
//!
//! Aggregation is opt-in: nothing is collected without a completion handler,
//! and [`WalkOptions`] decides whether stats and file contents are kept.

mod backend;
mod engine;
mod entry;
mod errors;
mod filter;
mod native_fs;
mod options;
mod pattern;
mod reader;
pub mod utils;

pub use backend::Backend;
pub use engine::CompleteHandler;
pub use engine::EntryHandler;
pub use engine::Handlers;
pub use engine::traverse;
pub use engine::traverse_with;
pub use entry::Completion;
pub use entry::Entry;
pub use entry::FileContent;
pub use entry::FileStat;
pub use entry::Kind;
pub use errors::Error;
pub use filter::traverse_files;
pub use filter::traverse_files_with;
pub use filter::traverse_matching;
pub use filter::traverse_matching_with;
pub use native_fs::NativeFs;
pub use options::WalkOptions;
pub use pattern::Pattern;
pub use reader::ReadCompleteHandler;
pub use reader::ReadHandler;
pub use reader::ReadHandlers;
pub use reader::read_matching;
pub use reader::read_matching_with;

#[cfg(feature = "test_utils")]
pub(crate) mod test_utils;
#[cfg(feature = "test_utils")]
pub use test_utils::MemoryFs;
#[cfg(feature = "test_utils")]
pub use test_utils::TestRoot;
