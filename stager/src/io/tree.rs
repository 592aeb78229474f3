//! Directory walking, hashing, and copying.

use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::snapshot::{Entry, EntryKind, Snapshot};

/// Walk `root` and record every file and directory below it.
///
/// Symlinks are not followed into directories. A symlink to a regular file
/// is recorded as a file; dangling or directory symlinks are skipped.
pub fn scan(root: &Path, hash_files: bool) -> Result<Snapshot> {
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }
    let mut snapshot = Snapshot::default();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        let path = entry.path();
        let rel = relative_key(root, path)?;
        let file_type = entry.file_type();

        let kind = if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else if file_type.is_symlink() {
            match fs::metadata(path) {
                Ok(meta) if meta.is_file() => EntryKind::File,
                Ok(_) => {
                    warn!(path = %path.display(), "skipping symlink to directory");
                    continue;
                }
                Err(err) => {
                    warn!(path = %path.display(), err = %err, "skipping dangling symlink");
                    continue;
                }
            }
        } else {
            warn!(path = %path.display(), "skipping special file");
            continue;
        };

        let entry = match kind {
            EntryKind::Dir => Entry::dir(),
            EntryKind::File if hash_files => Entry::file(Some(file_sha256(path)?)),
            EntryKind::File => Entry::file(None),
        };
        snapshot.insert(rel, entry);
    }
    debug!(root = %root.display(), entries = snapshot.len(), "scanned tree");
    Ok(snapshot)
}

/// Copy one snapshot entry from `src_root` to the same relative path under `dst_root`.
pub fn copy_entry(src_root: &Path, dst_root: &Path, rel: &str, entry: &Entry) -> Result<()> {
    let src = key_to_path(src_root, rel);
    let dst = key_to_path(dst_root, rel);
    match entry.kind {
        EntryKind::Dir => {
            fs::create_dir_all(&dst).with_context(|| format!("create {}", dst.display()))?;
        }
        EntryKind::File => {
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            fs::copy(&src, &dst)
                .with_context(|| format!("copy {} to {}", src.display(), dst.display()))?;
        }
    }
    Ok(())
}

/// Copy every entry of `snapshot` (taken from `src_root`) into `dst_root`.
pub fn copy_snapshot(src_root: &Path, dst_root: &Path, snapshot: &Snapshot) -> Result<()> {
    fs::create_dir_all(dst_root).with_context(|| format!("create {}", dst_root.display()))?;
    for (rel, entry) in snapshot.iter() {
        copy_entry(src_root, dst_root, rel, entry)?;
    }
    Ok(())
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).with_context(|| format!("read {}", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Join a `/`-separated snapshot key onto `root`.
pub fn key_to_path(root: &Path, rel: &str) -> PathBuf {
    rel.split('/').fold(root.to_path_buf(), |acc, part| acc.join(part))
}

fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| anyhow!("non-utf8 path {}", path.display()))?;
                parts.push(part);
            }
            other => bail!("unexpected path component {:?} in {}", other, path.display()),
        }
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = key_to_path(root, rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, contents).expect("write");
    }

    #[test]
    fn scan_records_nested_files_and_dirs() {
        let temp = tempdir().expect("tempdir");
        write(temp.path(), "a.txt", "a");
        write(temp.path(), "docs/deep/b.txt", "b");
        fs::create_dir_all(temp.path().join("empty")).expect("mkdir");

        let snapshot = scan(temp.path(), false).expect("scan");
        let keys: Vec<&str> = snapshot.iter().map(|(rel, _)| rel).collect();
        assert_eq!(
            keys,
            vec!["a.txt", "docs", "docs/deep", "docs/deep/b.txt", "empty"]
        );
        assert_eq!(snapshot.file_count(), 2);
        assert!(snapshot.get("a.txt").expect("a").sha256.is_none());
    }

    #[test]
    fn scan_hashes_when_requested() {
        let temp = tempdir().expect("tempdir");
        write(temp.path(), "a.txt", "abc");
        let snapshot = scan(temp.path(), true).expect("scan");
        assert_eq!(
            snapshot.get("a.txt").expect("a").sha256.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn scan_rejects_missing_root() {
        let temp = tempdir().expect("tempdir");
        let err = scan(&temp.path().join("missing"), false).expect_err("missing root");
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn copy_snapshot_reproduces_tree() {
        let temp = tempdir().expect("tempdir");
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        write(&src, "a.txt", "a");
        write(&src, "docs/b.txt", "b");
        fs::create_dir_all(src.join("empty")).expect("mkdir");

        let snapshot = scan(&src, true).expect("scan src");
        copy_snapshot(&src, &dst, &snapshot).expect("copy");

        assert_eq!(scan(&dst, true).expect("scan dst"), snapshot);
        assert_eq!(fs::read_to_string(dst.join("docs/b.txt")).expect("read"), "b");
    }

    #[cfg(unix)]
    #[test]
    fn scan_follows_file_symlinks_and_skips_dangling() {
        let temp = tempdir().expect("tempdir");
        write(temp.path(), "real.txt", "real");
        std::os::unix::fs::symlink(temp.path().join("real.txt"), temp.path().join("link.txt"))
            .expect("symlink");
        std::os::unix::fs::symlink(temp.path().join("nowhere"), temp.path().join("dangling"))
            .expect("symlink");

        let snapshot = scan(temp.path(), false).expect("scan");
        assert!(snapshot.get("link.txt").is_some());
        assert!(snapshot.get("dangling").is_none());
    }
}
