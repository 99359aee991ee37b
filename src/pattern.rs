use std::fmt::Display;
use std::path::Path as StdPath;
use std::str::FromStr;

use regex::Regex;

use crate::Error;

/// A predicate over a file's full path.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Matches when the regular expression finds a match anywhere in the
    /// path string. Anchor it with `^`/`$` to match the whole path.
    Regex(Regex),
    /// Matches when the shell glob matches the whole path string. `*` also
    /// matches path separators.
    Glob(glob::Pattern),
}

impl Pattern {
    /// Compiles a regular expression pattern.
    pub fn regex(source: &str) -> Result<Self, Error> {
        Regex::new(source)
            .map(Pattern::Regex)
            .map_err(|e| Error::InvalidPattern {
                what: source.to_owned(),
                how: e.to_string(),
            })
    }

    /// Compiles a glob pattern.
    pub fn glob(source: &str) -> Result<Self, Error> {
        glob::Pattern::new(source)
            .map(Pattern::Glob)
            .map_err(|e| Error::InvalidPattern {
                what: source.to_owned(),
                how: e.to_string(),
            })
    }

    /// Tests `path`. Both kinds see the path as lossy UTF-8, so a non UTF-8
    /// path can still match.
    pub fn matches_path(&self, path: &StdPath) -> bool {
        match self {
            Pattern::Regex(re) => re.is_match(&path.to_string_lossy()),
            Pattern::Glob(glob) => glob.matches(&path.to_string_lossy()),
        }
    }
}

impl From<Regex> for Pattern {
    fn from(re: Regex) -> Self {
        Pattern::Regex(re)
    }
}

impl From<glob::Pattern> for Pattern {
    fn from(glob: glob::Pattern) -> Self {
        Pattern::Glob(glob)
    }
}

impl FromStr for Pattern {
    type Err = Error;

    /// Parses a regular expression.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::regex(s)
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pattern::Regex(re) => write!(f, "/{}/", re.as_str()),
            Pattern::Glob(glob) => write!(f, "{}", glob.as_str()),
        }
    }
}
