//! Recursive source-tree walker for file-based parsers

use std::fs;
use std::path::{Path, PathBuf};

use cloudshift_types::{DiscoveryError, DiscoveryResult};

/// Directories never descended into
const SKIP_DIRS: &[&str] = &[".terraform", "node_modules", "target", "vendor"];

/// Whether `path` ends in one of `extensions` (compared case-insensitively, without dot)
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Collect every file under `root` whose extension is in `extensions`
///
/// A file path is returned as-is when it matches. Hidden directories and
/// tool caches are skipped. Output is sorted so parses are reproducible.
pub fn collect_files(root: &Path, extensions: &[&str]) -> DiscoveryResult<Vec<PathBuf>> {
    if !root.exists() {
        return Err(DiscoveryError::InvalidPath(root.display().to_string()));
    }

    let mut files = Vec::new();
    if root.is_file() {
        if has_extension(root, extensions) {
            files.push(root.to_path_buf());
        }
        return Ok(files);
    }

    walk_dir(root, extensions, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk_dir(dir: &Path, extensions: &[&str], files: &mut Vec<PathBuf>) -> DiscoveryResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || SKIP_DIRS.contains(&name.as_ref()) {
                continue;
            }
            walk_dir(&path, extensions, files)?;
        } else if file_type.is_file() && has_extension(&path, extensions) {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collects_matching_files_sorted_and_skips_caches() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("modules/net")).unwrap();
        fs::create_dir_all(root.join(".terraform/providers")).unwrap();
        fs::write(root.join("main.tf"), "").unwrap();
        fs::write(root.join("modules/net/vpc.tf"), "").unwrap();
        fs::write(root.join(".terraform/providers/cached.tf"), "").unwrap();
        fs::write(root.join("README.md"), "").unwrap();

        let files = collect_files(root, &["tf"]).unwrap();

        assert_eq!(
            files,
            vec![root.join("main.tf"), root.join("modules/net/vpc.tf")]
        );
    }

    #[test]
    fn test_single_file_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("deploy.YAML");
        fs::write(&file, "resources: []").unwrap();

        assert_eq!(collect_files(&file, &["yaml", "yml"]).unwrap(), vec![file.clone()]);
        assert!(collect_files(&file, &["tf"]).unwrap().is_empty());
    }

    #[test]
    fn test_missing_root_is_invalid_path() {
        let err = collect_files(Path::new("/definitely/not/here"), &["tf"]).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidPath(_)));
    }
}
