use std::path::{Path, PathBuf};

use globset::{GlobSet, GlobSetBuilder};
use tokio::fs;

use crate::error::{FormatError, Result};

/// Async discovery of candidate files under a root path.
///
/// The core receives an ordered list of paths from here and never walks
/// directories itself. Filtering is by extension first, then exclude
/// patterns, then include patterns (when any are given, at least one must
/// match).
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    /// File extensions to include (e.g., ["xml"])
    extensions: Vec<String>,
    include_set: Option<GlobSet>,
    exclude_set: Option<GlobSet>,
    /// Maximum depth for directory traversal (None = unlimited)
    max_depth: Option<usize>,
    follow_symlinks: bool,
}

impl FileDiscovery {
    pub fn new() -> Self {
        Self {
            extensions: vec!["xml".to_string()],
            include_set: None,
            exclude_set: None,
            max_depth: None,
            follow_symlinks: false,
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_lowercase()).collect();
        self
    }

    pub fn with_include_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        self.include_set = build_glob_set(&patterns, "include")?;
        Ok(self)
    }

    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        self.exclude_set = build_glob_set(&patterns, "exclude")?;
        Ok(self)
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Discover files under `path` (a directory or a single file), sorted
    /// for a deterministic processing order.
    pub async fn discover_files(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let metadata = fs::metadata(path).await.map_err(FormatError::from)?;

        let mut files = Vec::new();
        if metadata.is_file() {
            if self.should_process(path) {
                files.push(path.to_path_buf());
            }
            return Ok(files);
        }

        self.walk(path, 0, &mut files).await?;
        files.sort();
        Ok(files)
    }

    fn walk<'a>(
        &'a self,
        dir: &'a Path,
        depth: usize,
        files: &'a mut Vec<PathBuf>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + 'a>> {
        Box::pin(async move {
            let mut read_dir = fs::read_dir(dir).await.map_err(FormatError::from)?;

            while let Some(entry) = read_dir.next_entry().await.map_err(FormatError::from)? {
                let entry_path = entry.path();

                if entry_path.is_symlink() && !self.follow_symlinks {
                    continue;
                }

                let metadata = match fs::metadata(&entry_path).await {
                    Ok(metadata) => metadata,
                    Err(err) => {
                        // Unreadable entries must not abort the run.
                        eprintln!("Warning: cannot read {}: {}", entry_path.display(), err);
                        continue;
                    }
                };

                if metadata.is_file() {
                    if self.should_process(&entry_path) {
                        files.push(entry_path);
                    }
                } else if metadata.is_dir() {
                    if let Some(max_depth) = self.max_depth
                        && depth >= max_depth
                    {
                        continue;
                    }
                    if let Err(err) = self.walk(&entry_path, depth + 1, files).await {
                        eprintln!("Warning: error processing {}: {}", entry_path.display(), err);
                    }
                }
            }

            Ok(())
        })
    }

    /// Check if a file should be processed based on extension and patterns.
    pub fn should_process(&self, path: &Path) -> bool {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(extension) if self.extensions.contains(&extension.to_lowercase()) => {}
            _ => return false,
        }

        if let Some(exclude_set) = &self.exclude_set
            && exclude_set.is_match(path)
        {
            return false;
        }

        if let Some(include_set) = &self.include_set {
            return include_set.is_match(path);
        }

        true
    }
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

fn build_glob_set(patterns: &[String], which: &str) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = globset::GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|err| {
                FormatError::Config(format!("invalid {which} glob pattern '{pattern}': {err}"))
            })?;
        builder.add(glob);
    }

    let set = builder
        .build()
        .map_err(|err| FormatError::Config(format!("failed to build {which} glob set: {err}")))?;
    Ok(Some(set))
}
