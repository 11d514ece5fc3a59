//! Filesystem utility functions
//!
//! Tree copy, size and move helpers shared by the store and the CLI.

use std::fs;
use std::path::Path;

use crate::error::{ProfileError, ProfileResult};

/// Recursively calculate the total size of a directory in bytes.
///
/// Symbolic links are not followed.
pub fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            total += metadata.len();
        } else if metadata.is_dir() {
            total += dir_size(&entry.path())?;
        }
    }
    Ok(total)
}

/// Recursively copy a directory and all its contents to a new location.
///
/// `src` itself may be a symlink (a redirected root); it is followed. Symlinks
/// found inside the tree are recreated as symlinks rather than followed.
///
/// # Errors
/// Returns an error if:
/// - Source doesn't exist or is not a directory
/// - Destination cannot be created
/// - Any file, link or directory cannot be copied
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> ProfileResult<()> {
    let meta = fs::metadata(src).map_err(|e| ProfileError::io(src, e))?;
    if !meta.is_dir() {
        return Err(ProfileError::io(
            src,
            std::io::Error::other("source is not a directory"),
        ));
    }

    fs::create_dir_all(dst).map_err(|e| ProfileError::io(dst, e))?;

    for entry in fs::read_dir(src).map_err(|e| ProfileError::io(src, e))? {
        let entry = entry.map_err(|e| ProfileError::io(src, e))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| ProfileError::io(&src_path, e))?;

        if file_type.is_symlink() {
            let target = fs::read_link(&src_path).map_err(|e| ProfileError::io(&src_path, e))?;
            copy_symlink(&src_path, &target, &dst_path)?;
        } else if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path).map_err(|e| ProfileError::io(&dst_path, e))?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(_src: &Path, target: &Path, dst: &Path) -> ProfileResult<()> {
    std::os::unix::fs::symlink(target, dst).map_err(|e| ProfileError::io(dst, e))
}

#[cfg(windows)]
fn copy_symlink(src: &Path, target: &Path, dst: &Path) -> ProfileResult<()> {
    let result = if src.is_dir() {
        std::os::windows::fs::symlink_dir(target, dst)
    } else {
        std::os::windows::fs::symlink_file(target, dst)
    };
    result.map_err(|e| ProfileError::io(dst, e))
}

/// Move a directory, falling back to copy + delete across filesystems
pub fn move_dir(src: &Path, dst: &Path) -> ProfileResult<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| ProfileError::io(parent, e))?;
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::CrossesDevices => {
            copy_dir_recursive(src, dst)?;
            fs::remove_dir_all(src).map_err(|e| ProfileError::io(src, e))
        }
        Err(err) => Err(ProfileError::io(src, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_dir_recursive_nested() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("User/globalStorage")).unwrap();
        fs::write(src.join("User/settings.json"), "{}").unwrap();
        fs::write(src.join("User/globalStorage/state.db"), "db").unwrap();

        let dst = temp.path().join("dst");
        copy_dir_recursive(&src, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("User/settings.json")).unwrap(), "{}");
        assert!(dst.join("User/globalStorage/state.db").exists());
        assert_eq!(dir_size(&dst).unwrap(), 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_preserves_inner_symlinks() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("real.txt"), "x").unwrap();
        std::os::unix::fs::symlink("real.txt", src.join("link.txt")).unwrap();

        let dst = temp.path().join("dst");
        copy_dir_recursive(&src, &dst).unwrap();

        assert_eq!(
            fs::read_link(dst.join("link.txt")).unwrap(),
            Path::new("real.txt")
        );
    }

    #[test]
    fn test_copy_missing_source_fails() {
        let temp = TempDir::new().unwrap();
        let result = copy_dir_recursive(&temp.path().join("nope"), &temp.path().join("dst"));
        assert!(matches!(result, Err(ProfileError::Io { .. })));
    }

    #[test]
    fn test_move_dir() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("f"), "1").unwrap();

        let dst = temp.path().join("backups/a.1");
        move_dir(&src, &dst).unwrap();

        assert!(!src.exists());
        assert!(dst.join("f").exists());
    }
}
