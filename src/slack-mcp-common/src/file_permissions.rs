//! Owner-only file and directory helpers.
//!
//! The credential store and error log keep secrets on disk; everything they
//! write must be readable by the owning user only (0600 files inside 0700
//! directories).

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// Create (or truncate) a file with mode 0600.
///
/// The mode is set at open time so the file is never observable with wider
/// permissions, even transiently.
pub fn create_owner_only_file(path: impl AsRef<Path>) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        options.mode(0o600);
    }

    options.open(path)
}

/// Set mode 0600 on an existing file.
///
/// No-op on non-Unix platforms.
pub fn set_owner_only(path: impl AsRef<Path>) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

/// Create a directory (and any missing parents) with mode 0700.
pub fn create_private_dir_all(path: impl AsRef<Path>) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;

        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(path)
    }

    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(path)
    }
}

/// Open or create a file for appending.
pub fn open_for_append(path: impl AsRef<Path>) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_create_owner_only_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("secret.json");

        let mut file = create_owner_only_file(&file_path).unwrap();
        file.write_all(b"{}").unwrap();
        drop(file);

        assert!(file_path.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&file_path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn test_set_owner_only_on_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("wide.json");
        std::fs::write(&file_path, "{}").unwrap();

        set_owner_only(&file_path).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&file_path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn test_create_private_dir_all() {
        let temp_dir = TempDir::new().unwrap();
        let dir_path = temp_dir.path().join("a").join("b");

        create_private_dir_all(&dir_path).unwrap();
        assert!(dir_path.is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dir_path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o700);
        }
    }

    #[test]
    fn test_open_for_append() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("log.jsonl");

        {
            let mut file = open_for_append(&file_path).unwrap();
            file.write_all(b"one\n").unwrap();
        }
        {
            let mut file = open_for_append(&file_path).unwrap();
            file.write_all(b"two\n").unwrap();
        }

        let content = std::fs::read_to_string(&file_path).unwrap();
        assert_eq!(content, "one\ntwo\n");
    }
}
