//! Media discovery for finding images in files and directories.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::DiscoveryConfig;
use crate::prompt::EditTag;

/// Discovers supported media files.
pub struct MediaDiscovery {
    config: DiscoveryConfig,
}

/// A media file found on disk.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Full path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

impl DiscoveredFile {
    /// Edit variant encoded in the file stem, e.g. `harbour_bw.jpg`.
    pub fn edit_tag(&self) -> Option<EditTag> {
        let stem = self.path.file_stem()?.to_str()?;
        EditTag::ALL
            .into_iter()
            .find(|tag| stem.len() > tag.as_str().len() && stem.ends_with(tag.as_str()))
    }

    /// Path of the unedited original a tagged variant was derived from.
    pub fn original_path(&self) -> Option<PathBuf> {
        let tag = self.edit_tag()?;
        let stem = self.path.file_stem()?.to_str()?;
        let base = &stem[..stem.len() - tag.as_str().len()];
        let name = match self.path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{base}.{ext}"),
            None => base.to_string(),
        };
        Some(self.path.with_file_name(name))
    }
}

impl MediaDiscovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Discover all supported media at a path.
    ///
    /// A file is returned if its extension is supported. A directory is walked
    /// recursively. Results are sorted by path.
    pub fn discover(&self, path: &Path) -> Vec<DiscoveredFile> {
        if path.is_file() {
            if self.is_supported(path) {
                if let Ok(meta) = std::fs::metadata(path) {
                    return vec![DiscoveredFile {
                        path: path.to_path_buf(),
                        size: meta.len(),
                    }];
                }
            }
            return vec![];
        }

        let mut files: Vec<DiscoveredFile> = WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|entry| entry.file_type().is_file() && self.is_supported(entry.path()))
            .filter_map(|entry| {
                let size = entry.metadata().ok()?.len();
                Some(DiscoveredFile {
                    path: entry.into_path(),
                    size,
                })
            })
            .collect();

        files.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!("Discovered {} media files under {:?}", files.len(), path);
        files
    }

    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.config
                    .supported_formats
                    .iter()
                    .any(|fmt| fmt.eq_ignore_ascii_case(ext))
            })
    }

    pub fn total_size(files: &[DiscoveredFile]) -> u64 {
        files.iter().map(|f| f.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovery() -> MediaDiscovery {
        MediaDiscovery::new(DiscoveryConfig::default())
    }

    #[test]
    fn test_is_supported() {
        let discovery = discovery();
        assert!(discovery.is_supported(Path::new("test.jpg")));
        assert!(discovery.is_supported(Path::new("test.JPG")));
        assert!(discovery.is_supported(Path::new("test.tiff")));
        assert!(!discovery.is_supported(Path::new("test.txt")));
        assert!(!discovery.is_supported(Path::new("noext")));
    }

    #[test]
    fn test_discover_walks_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.png"), [1, 2, 3]).unwrap();
        std::fs::write(dir.path().join("nested/a.JPG"), [1]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip").unwrap();

        let files = discovery().discover(dir.path());
        let names: Vec<_> = files
            .iter()
            .map(|f| f.path.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(names, vec![PathBuf::from("b.png"), PathBuf::from("nested/a.JPG")]);
        assert_eq!(MediaDiscovery::total_size(&files), 4);
    }

    #[test]
    fn test_discover_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lake.webp");
        std::fs::write(&file, [0; 10]).unwrap();
        assert_eq!(discovery().discover(&file).len(), 1);
        assert!(discovery().discover(&dir.path().join("missing.jpg")).is_empty());
    }

    #[test]
    fn test_edit_tag_from_stem() {
        let file = DiscoveredFile {
            path: PathBuf::from("/photos/harbour_bw.jpg"),
            size: 0,
        };
        assert_eq!(file.edit_tag(), Some(EditTag::BlackAndWhite));
        assert_eq!(file.original_path(), Some(PathBuf::from("/photos/harbour.jpg")));

        let plain = DiscoveredFile {
            path: PathBuf::from("/photos/harbour.jpg"),
            size: 0,
        };
        assert_eq!(plain.edit_tag(), None);
        assert_eq!(plain.original_path(), None);
    }
}
