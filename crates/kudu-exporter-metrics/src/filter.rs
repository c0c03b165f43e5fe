//! Include/exclude metric filters.
//!
//! Filters are plain text files with one raw metric name per line. Lines
//! are trimmed; blank lines and `#` comments are ignored.
//!
//! A non-empty include list wins outright: only listed metrics are kept and
//! the exclude list is not consulted at all. Otherwise listed exclude names
//! are dropped and everything else is kept.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::FilterFileError;

/// Optional locations of the include and exclude files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPaths {
    pub include: Option<PathBuf>,
    pub exclude: Option<PathBuf>,
}

impl FilterPaths {
    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }

    /// Configured paths, include first.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.include.iter().chain(self.exclude.iter()).map(PathBuf::as_path)
    }
}

/// Which rule list is in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    KeepAll,
    Include,
    Exclude,
}

/// The active metric filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    include: HashSet<String>,
    exclude: HashSet<String>,
}

impl FilterSet {
    /// A filter that keeps everything.
    pub fn keep_all() -> Self {
        Self::default()
    }

    pub fn from_names<I, E>(include: I, exclude: E) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            include: include.into_iter().map(Into::into).collect(),
            exclude: exclude.into_iter().map(Into::into).collect(),
        }
    }

    /// Load both lists. A configured file that cannot be read is an error.
    pub fn load(paths: &FilterPaths) -> Result<Self, FilterFileError> {
        let include = match &paths.include {
            Some(path) => read_names(path)?,
            None => HashSet::new(),
        };
        let exclude = match &paths.exclude {
            Some(path) => read_names(path)?,
            None => HashSet::new(),
        };

        let filters = Self { include, exclude };
        info!(
            mode = ?filters.mode(),
            include = filters.include.len(),
            exclude = filters.exclude.len(),
            "metric filters loaded"
        );
        Ok(filters)
    }

    /// Replace the rule lists from disk.
    ///
    /// Both files are read before anything is replaced, so on error the
    /// current rules stay in effect.
    pub fn reload(&mut self, paths: &FilterPaths) -> Result<(), FilterFileError> {
        *self = Self::load(paths)?;
        Ok(())
    }

    pub fn mode(&self) -> FilterMode {
        if !self.include.is_empty() {
            FilterMode::Include
        } else if !self.exclude.is_empty() {
            FilterMode::Exclude
        } else {
            FilterMode::KeepAll
        }
    }

    /// Whether a raw (unprefixed) metric name should be published.
    pub fn should_keep(&self, raw_name: &str) -> bool {
        match self.mode() {
            FilterMode::Include => self.include.contains(raw_name),
            FilterMode::Exclude => !self.exclude.contains(raw_name),
            FilterMode::KeepAll => true,
        }
    }
}

fn read_names(path: &Path) -> Result<HashSet<String>, FilterFileError> {
    let content = std::fs::read_to_string(path).map_err(|source| FilterFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let names: HashSet<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();

    debug!(path = %path.display(), names = names.len(), "filter file read");
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn no_filters_keep_everything() {
        let filters = FilterSet::keep_all();
        assert_eq!(filters.mode(), FilterMode::KeepAll);
        assert!(filters.should_keep("anything"));
    }

    #[test]
    fn include_mode_keeps_only_listed() {
        let filters = FilterSet::from_names(["foo"], Vec::<String>::new());
        assert_eq!(filters.mode(), FilterMode::Include);
        assert!(filters.should_keep("foo"));
        assert!(!filters.should_keep("bar"));
    }

    #[test]
    fn exclude_mode_drops_only_listed() {
        let filters = FilterSet::from_names(Vec::<String>::new(), ["bar"]);
        assert_eq!(filters.mode(), FilterMode::Exclude);
        assert!(filters.should_keep("foo"));
        assert!(!filters.should_keep("bar"));
    }

    #[test]
    fn include_wins_over_exclude() {
        // "foo" is in both lists; the exclude list is never consulted.
        let filters = FilterSet::from_names(["foo"], ["foo", "bar"]);
        assert_eq!(filters.mode(), FilterMode::Include);
        assert!(filters.should_keep("foo"));
        assert!(!filters.should_keep("bar"));
        assert!(!filters.should_keep("baz"));
    }

    #[test]
    fn load_trims_and_skips_comments() {
        let dir = tempfile::tempdir().unwrap();
        let include = write_file(&dir, "include.txt", "  rows_inserted \n\n# comment\nscans_started\nrows_inserted\n");

        let filters = FilterSet::load(&FilterPaths {
            include: Some(include),
            exclude: None,
        })
        .unwrap();

        assert!(filters.should_keep("rows_inserted"));
        assert!(filters.should_keep("scans_started"));
        assert!(!filters.should_keep("# comment"));
        assert!(!filters.should_keep("memrowset_size"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FilterSet::load(&FilterPaths {
            include: None,
            exclude: Some(dir.path().join("nope.txt")),
        })
        .unwrap_err();
        assert!(err.to_string().contains("nope.txt"));
    }

    #[test]
    fn failed_reload_keeps_current_rules() {
        let dir = tempfile::tempdir().unwrap();
        let mut filters = FilterSet::from_names(["foo"], Vec::<String>::new());

        let result = filters.reload(&FilterPaths {
            include: Some(dir.path().join("gone.txt")),
            exclude: None,
        });
        assert!(result.is_err());
        assert!(filters.should_keep("foo"));
        assert!(!filters.should_keep("bar"));
    }

    #[test]
    fn reload_switches_mode() {
        let dir = tempfile::tempdir().unwrap();
        let exclude = write_file(&dir, "exclude.txt", "foo\n");
        let mut filters = FilterSet::from_names(["foo"], Vec::<String>::new());

        filters
            .reload(&FilterPaths {
                include: None,
                exclude: Some(exclude),
            })
            .unwrap();

        assert_eq!(filters.mode(), FilterMode::Exclude);
        assert!(!filters.should_keep("foo"));
        assert!(filters.should_keep("bar"));
    }

    #[test]
    fn paths_iterate_include_first() {
        let paths = FilterPaths {
            include: Some(PathBuf::from("/a")),
            exclude: Some(PathBuf::from("/b")),
        };
        let all: Vec<&Path> = paths.iter().collect();
        assert_eq!(all, vec![Path::new("/a"), Path::new("/b")]);
        assert!(FilterPaths::default().is_empty());
    }
}
