use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::crypto::{Credential, CredentialError};

pub const APP_NAME: &str = "ffsend";
pub const CERT_FILE_NAME: &str = "cert.pem";
pub const KEY_FILE_NAME: &str = "key.pem";

const DIR_MODE: u32 = 0o700;
const CERT_MODE: u32 = 0o644;
const KEY_MODE: u32 = 0o600;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no credential found in {0}. Run 'ffsend generate' first")]
    Missing(PathBuf),

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("invalid credential: {0}")]
    Invalid(#[from] CredentialError),

    #[error("failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result of [`CredentialStore::generate`]
#[derive(Debug, Clone)]
pub enum Generated {
    /// A new credential was generated and written to disk
    Created(Credential),
    /// A credential was already present and `force` was not set; nothing was written
    Existing(Credential),
}

impl Generated {
    pub fn credential(&self) -> &Credential {
        match self {
            Generated::Created(credential) | Generated::Existing(credential) => credential,
        }
    }

    pub fn into_credential(self) -> Credential {
        match self {
            Generated::Created(credential) | Generated::Existing(credential) => credential,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Generated::Created(_))
    }
}

/// Stores this node's credential as two PEM files in one directory.
///
/// The certificate and key are either both present as regular files, or the
/// credential is considered absent. Writes go through temp files and renames,
/// and the certificate is renamed into place last, so an interrupted save
/// never leaves a pair that [`CredentialStore::exists`] accepts but that
/// does not belong together.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the default storage directory (~/.ffsend)
    pub fn default_dir() -> Result<PathBuf, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Store at the custom directory if given, ~/.ffsend otherwise
    pub fn at(custom_path: Option<PathBuf>) -> Result<Self, StoreError> {
        match custom_path {
            Some(path) => Ok(Self::new(path)),
            None => Ok(Self::new(Self::default_dir()?)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cert_path(&self) -> PathBuf {
        self.dir.join(CERT_FILE_NAME)
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILE_NAME)
    }

    /// Check that both files are present and are regular files
    ///
    /// Any stat error counts as absent.
    pub fn exists(&self) -> bool {
        [self.cert_path(), self.key_path()]
            .iter()
            .all(|path| match fs::metadata(path) {
                Ok(meta) => meta.is_file(),
                Err(_) => false,
            })
    }

    /// Generate a new credential and save it, unless one already exists
    ///
    /// With `force` set, any existing credential is replaced. Nothing is
    /// written if generation fails. Without `force`, an existing pair is
    /// loaded and returned. A pair that fails to decode is an error and is
    /// left untouched.
    pub fn generate(&self, force: bool) -> Result<Generated, StoreError> {
        if self.exists() && !force {
            tracing::info!(dir = %self.dir.display(), "credential already present, not overwriting");
            return Ok(Generated::Existing(self.load()?));
        }

        let credential = Credential::generate()?;
        self.save(&credential)?;

        tracing::info!(dir = %self.dir.display(), "generated new credential");
        Ok(Generated::Created(credential))
    }

    /// Load the credential from disk
    pub fn load(&self) -> Result<Credential, StoreError> {
        let cert_pem = self.read(&self.cert_path())?;
        let key_pem = self.read(&self.key_path())?;
        Ok(Credential::from_pem(&cert_pem, &key_pem)?)
    }

    fn read(&self, path: &Path) -> Result<String, StoreError> {
        fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::Missing(self.dir.clone()),
            _ => StoreError::Io(e),
        })
    }

    /// Write the credential to disk, replacing any previous one
    pub fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        self.ensure_dir()?;

        let (cert_pem, key_pem) = credential.to_pem();
        let cert_tmp = self.stage(cert_pem.as_bytes(), CERT_MODE)?;
        let key_tmp = self.stage(key_pem.as_bytes(), KEY_MODE)?;

        let cert_path = self.cert_path();
        let key_path = self.key_path();

        // old certificate goes first: a crash between the renames
        // leaves an incomplete pair, never a mismatched one
        match fs::remove_file(&cert_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        persist(key_tmp, &key_path)?;
        persist(cert_tmp, &cert_path)?;

        tracing::debug!(
            cert = %cert_path.display(),
            key = %key_path.display(),
            "saved credential"
        );
        Ok(())
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        create_private_dir(&self.dir)?;
        Ok(())
    }

    fn stage(&self, contents: &[u8], mode: u32) -> Result<NamedTempFile, StoreError> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        set_mode(tmp.path(), mode)?;
        Ok(tmp)
    }
}

/// Create `dir` (and any missing parents) and restrict it to its owner.
///
/// An existing directory is restricted as well.
pub fn create_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(dir)?;
    set_mode(dir, DIR_MODE)
}

fn persist(tmp: NamedTempFile, path: &Path) -> Result<(), StoreError> {
    tmp.persist(path).map_err(|e| StoreError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
