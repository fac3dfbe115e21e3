//! Filesystem persistence for key files and command output.

use anyhow::{Context, Result};
use getrandom::fill;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::keyfile::KeyFile;
use crate::store::KeyStore;

/// A storage backend for the key file and command output.
///
/// `Storage` reads the JSON key file and writes files so that they are only
/// ever replaced atomically.
#[derive(Clone, Debug)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    /// Creates a new Storage instance with the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns `true` if the file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Returns the path to the file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Reads the key file, or an empty one if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid key file.
    pub fn read_keys(&self) -> Result<KeyFile> {
        if !self.exists() {
            return Ok(KeyFile::new());
        }
        let data = fs::read(&self.path)
            .with_context(|| format!("failed to read key file {}", self.path.display()))?;
        KeyFile::parse(&data)
    }

    /// Reads the key file into a fresh [`KeyStore`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or an entry holds an
    /// invalid key.
    pub fn load_store(&self) -> Result<KeyStore> {
        let store = KeyStore::new();
        self.read_keys()?.load_into(&store)?;
        tracing::debug!(path = %self.path.display(), keys = store.len(), "loaded key file");
        Ok(store)
    }

    /// Serializes `keys` and writes them with [`Storage::write_atomic`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_keys(&self, keys: &KeyFile) -> Result<()> {
        self.write_atomic(&keys.to_bytes()?)
    }

    /// Writes data by way of a temporary file in the same directory.
    ///
    /// The temporary file is synced, renamed over the target, and the parent
    /// directory is synced, so a crash leaves either the old or the new
    /// content. Creates parent directories if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_atomic(&self, data: &[u8]) -> Result<()> {
        if let Some(parent) = self.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.random_tmp_path()?;

        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .context("failed to create temporary file")?;

        tmp_file.write_all(data)?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        if let Err(e) = self.atomic_replace(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        if let Some(parent) = self.parent() {
            let dir = File::open(parent)?;
            dir.sync_all()?;
        }

        Ok(())
    }

    /// Parent directory, `None` for a bare file name in the working directory.
    fn parent(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }

    /// Generates a unique temporary file path in the same directory.
    ///
    /// Format: `filename.tmp.<randomhex>`
    fn random_tmp_path(&self) -> Result<PathBuf> {
        let mut buf = [0u8; 8];
        fill(&mut buf).map_err(|_| anyhow::anyhow!("OS random generator unavailable"))?;

        let rand_string = buf.iter().map(|b| format!("{:02x}", b)).collect::<String>();

        let file_name = self
            .path
            .file_name()
            .context("output path has no file name")?
            .to_string_lossy();

        let tmp_name = format!("{}.tmp.{}", file_name, rand_string);

        Ok(self.path.with_file_name(tmp_name))
    }

    /// Atomically replaces the target file with the temporary file.
    ///
    /// Uses `ReplaceFileW` with `REPLACEFILE_WRITE_THROUGH`, falling back to
    /// a rename when the target does not exist yet.
    #[cfg(target_os = "windows")]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

        if !self.path.exists() {
            fs::rename(tmp_path, &self.path)?;
            return Ok(());
        }

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target_w = to_wide(self.path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY:
        // - Strings are valid UTF-16 and null-terminated
        // - Pointers remain valid during the call
        // - Windows does not retain the pointers after return
        let result = unsafe {
            ReplaceFileW(
                target_w.as_ptr(),
                tmp_w.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        };

        if result == 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).context("atomic replace failed");
        }

        Ok(())
    }

    /// Atomically replaces the target file with the temporary file.
    ///
    /// On Unix, `rename()` is atomic when both paths are on the same filesystem.
    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }
}
