//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Copying one file with modification time preservation
//! - Resolving device paths below a mount root

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Copy a file from source to destination with metadata preservation.
///
/// The destination's parent directory must already exist, as it must for a
/// copy protocol writing to a device.
///
/// # Returns
/// Number of bytes copied
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> io::Result<u64> {
    let mut src_file = fs::File::open(src)?;

    // Get source metadata for modification time
    let src_mtime = src_file.metadata()?.modified().ok();

    let mut dst_file = fs::File::create(dst)?;
    let bytes_copied = io::copy(&mut src_file, &mut dst_file)?;
    dst_file.sync_all()?;
    drop(dst_file);

    // Preserve modification time if available
    if let Some(mtime) = src_mtime {
        let _ = filetime::set_file_mtime(dst, filetime::FileTime::from_system_time(mtime));
    }

    Ok(bytes_copied)
}

/// Map an absolute device path onto a directory that mirrors the device
/// filesystem.
///
/// Leading `/` and `.` components are dropped. Returns `None` for paths that
/// would climb out of `root`.
pub fn resolve_under_root(root: &Path, device_path: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    for component in Path::new(device_path).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_copy_file_with_metadata() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        let dst_file = temp_dir.path().join("dest.txt");

        let mut file = fs::File::create(&src_file).expect("Failed to create source");
        file.write_all(b"test content").expect("Failed to write source");
        drop(file);

        let bytes = copy_file_with_metadata(&src_file, &dst_file).expect("Failed to copy");
        assert_eq!(bytes, 12);

        let content = fs::read_to_string(&dst_file).expect("Failed to read dest");
        assert_eq!(content, "test content");

        let src_mtime = fs::metadata(&src_file).and_then(|m| m.modified()).expect("src mtime");
        let dst_mtime = fs::metadata(&dst_file).and_then(|m| m.modified()).expect("dst mtime");
        assert_eq!(src_mtime, dst_mtime);
    }

    #[test]
    fn test_copy_overwrites_existing_destination() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        let dst_file = temp_dir.path().join("dest.txt");
        fs::write(&src_file, "new").expect("Failed to write source");
        fs::write(&dst_file, "much older content").expect("Failed to write dest");

        copy_file_with_metadata(&src_file, &dst_file).expect("Failed to copy");
        assert_eq!(fs::read_to_string(&dst_file).expect("read"), "new");
    }

    #[test]
    fn test_copy_into_missing_directory_fails() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        fs::write(&src_file, "x").expect("Failed to write source");

        let dst_file = temp_dir.path().join("missing").join("dest.txt");
        let err = copy_file_with_metadata(&src_file, &dst_file).expect_err("no parent dir");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_resolve_under_root() {
        let root = Path::new("/mnt/device");
        assert_eq!(
            resolve_under_root(root, "/var/tmp/image.tgz"),
            Some(PathBuf::from("/mnt/device/var/tmp/image.tgz"))
        );
        assert_eq!(
            resolve_under_root(root, "./config/a.conf"),
            Some(PathBuf::from("/mnt/device/config/a.conf"))
        );
        assert_eq!(resolve_under_root(root, "/var/../etc/passwd"), None);
    }
}
