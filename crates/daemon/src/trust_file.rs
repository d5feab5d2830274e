use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use common::crypto::{Identity, IdentityError, TrustSet};
use common::store::create_private_dir;
use tempfile::NamedTempFile;

const HEADER: &str = "# Peer identities this node accepts, one per line.\n\
# Each is the hex SHA-256 of a peer's public key (see 'ffsend identity').\n";

#[derive(Debug, thiserror::Error)]
pub enum TrustFileError {
    #[error("{path}:{line}: invalid identity: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: IdentityError,
    },

    #[error("failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// The pinned peer identities, one hex identity per line.
///
/// Blank lines and `#` comments are ignored. An absent file and an empty
/// file mean different things, see [`resolve_trust`].
#[derive(Debug, Clone)]
pub struct TrustFile {
    path: PathBuf,
}

impl TrustFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file, or `None` if it does not exist
    pub fn load(&self) -> Result<Option<TrustSet>, TrustFileError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.parse(&contents).map(Some)
    }

    fn parse(&self, contents: &str) -> Result<TrustSet, TrustFileError> {
        let mut trust = TrustSet::empty();
        for (index, line) in contents.lines().enumerate() {
            let entry = match line.split_once('#') {
                Some((entry, _comment)) => entry,
                None => line,
            }
            .trim();
            if entry.is_empty() {
                continue;
            }

            let identity = Identity::from_hex(entry).map_err(|source| TrustFileError::Parse {
                path: self.path.clone(),
                line: index + 1,
                source,
            })?;
            trust.insert(identity);
        }
        Ok(trust)
    }

    /// Pin `identity`, creating the file if needed.
    /// Returns false if it was already pinned.
    pub fn add(&self, identity: Identity) -> Result<bool, TrustFileError> {
        let mut trust = self.load()?.unwrap_or_default();
        if !trust.insert(identity) {
            return Ok(false);
        }
        self.save(&trust)?;
        Ok(true)
    }

    /// Replace the file's contents with `trust`
    pub fn save(&self, trust: &TrustSet) -> Result<(), TrustFileError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                create_private_dir(parent)?;
                parent
            }
            _ => Path::new("."),
        };

        let mut contents = String::from(HEADER);
        for identity in trust.sorted() {
            contents.push_str(&identity.to_hex());
            contents.push('\n');
        }

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| TrustFileError::Persist {
                path: self.path.clone(),
                source: e.error,
            })?;

        tracing::debug!(path = %self.path.display(), peers = trust.len(), "saved trust file");
        Ok(())
    }
}

/// Decide which peers an endpoint accepts.
///
/// Identities given explicitly win over the file. Without either, the node
/// trusts only its own identity, so one operator can run both ends with a
/// single credential. A file that exists but lists nobody accepts nobody.
pub fn resolve_trust(
    explicit: &[Identity],
    file: &TrustFile,
    local: Identity,
) -> Result<TrustSet, TrustFileError> {
    if !explicit.is_empty() {
        return Ok(explicit.iter().copied().collect());
    }

    match file.load()? {
        Some(trust) => {
            if trust.is_empty() {
                tracing::warn!(path = %file.path().display(), "trust file lists no peers, every connection will be rejected");
            }
            Ok(trust)
        }
        None => {
            tracing::debug!(path = %file.path().display(), "no trust file, trusting only this node's identity");
            Ok(TrustSet::only(local))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn identity(seed: u8) -> Identity {
        Identity::from([seed; 32])
    }

    fn trust_file() -> (TrustFile, TempDir) {
        let temp = TempDir::new().unwrap();
        let file = TrustFile::new(temp.path().join("ffsend").join("trusted_peers"));
        (file, temp)
    }

    #[test]
    fn test_absent_file_loads_as_none() {
        let (file, _temp) = trust_file();
        assert!(file.load().unwrap().is_none());
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let (file, _temp) = trust_file();
        fs::create_dir_all(file.path().parent().unwrap()).unwrap();
        let contents = format!(
            "# laptop\n\n{}\n   {}   # desktop\n",
            identity(1).to_hex(),
            identity(2).to_hex().to_uppercase()
        );
        fs::write(file.path(), contents).unwrap();

        let trust = file.load().unwrap().unwrap();
        assert_eq!(trust.sorted(), vec![identity(1), identity(2)]);
    }

    #[test]
    fn test_bad_line_is_reported() {
        let (file, _temp) = trust_file();
        fs::create_dir_all(file.path().parent().unwrap()).unwrap();
        fs::write(file.path(), format!("{}\nnot-hex\n", identity(1).to_hex())).unwrap();

        match file.load() {
            Err(TrustFileError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected a parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_add_creates_and_deduplicates() {
        let (file, _temp) = trust_file();

        assert!(file.add(identity(3)).unwrap());
        assert!(file.add(identity(4)).unwrap());
        assert!(!file.add(identity(3)).unwrap());

        let trust = file.load().unwrap().unwrap();
        assert_eq!(trust.sorted(), vec![identity(3), identity(4)]);

        let leftovers: Vec<_> = fs::read_dir(file.path().parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .filter(|name| name != "trusted_peers")
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {:?}", leftovers);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let dir = file.path().parent().unwrap();
            let mode = fs::metadata(dir).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o700);
        }
    }

    #[test]
    fn test_resolve_without_file_trusts_self() {
        let (file, _temp) = trust_file();
        let trust = resolve_trust(&[], &file, identity(9)).unwrap();
        assert_eq!(trust, TrustSet::only(identity(9)));
    }

    #[test]
    fn test_resolve_empty_file_trusts_nobody() {
        let (file, _temp) = trust_file();
        file.save(&TrustSet::empty()).unwrap();

        let trust = resolve_trust(&[], &file, identity(9)).unwrap();
        assert!(trust.is_empty());
    }

    #[test]
    fn test_resolve_explicit_overrides_file() {
        let (file, _temp) = trust_file();
        file.add(identity(1)).unwrap();

        let trust = resolve_trust(&[identity(2), identity(3)], &file, identity(9)).unwrap();
        assert_eq!(trust.sorted(), vec![identity(2), identity(3)]);
    }
}
