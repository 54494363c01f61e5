//! The identity file kept after registration.
//!
//! Two lines: the display name, then the identifier as 32 hex digits. Extra
//! lines are ignored so files written by other clients still load.

use std::path::Path;

use keyrelay_core::{ClientId, ClientName};

use crate::error::{ClientError, ClientResult};

/// A registered client as remembered on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: ClientName,
    pub id: ClientId,
}

impl Identity {
    pub fn new(name: ClientName, id: ClientId) -> Self {
        Self { name, id }
    }

    /// Reads an identity file.
    pub fn load(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Identity(format!(
                "cannot read {} ({}); run `keyrelay register <name>` first",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    /// Parses identity file contents.
    pub fn parse(content: &str) -> ClientResult<Self> {
        let mut lines = content.lines();
        let (Some(name), Some(id)) = (lines.next(), lines.next()) else {
            return Err(ClientError::Identity(
                "identity file needs a name line and an id line".into(),
            ));
        };

        let name = ClientName::new(name.trim())
            .map_err(|e| ClientError::Identity(format!("bad name line: {}", e)))?;
        let id = id
            .trim()
            .parse()
            .map_err(|e| ClientError::Identity(format!("bad id line: {}", e)))?;
        Ok(Self { name, id })
    }

    /// Writes the identity file, creating parent directories.
    pub fn save(&self, path: &Path) -> ClientResult<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, format!("{}\n{}\n", self.name, self.id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("me.info");
        let identity = Identity::new(ClientName::new("Alice").unwrap(), ClientId::generate());

        identity.save(&path).unwrap();
        assert_eq!(Identity::load(&path).unwrap(), identity);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Alice");
        assert_eq!(lines[1].len(), 32);
    }

    #[test]
    fn parse_ignores_trailing_lines() {
        let identity =
            Identity::parse("Bob\n000102030405060708090a0b0c0d0e0f\nMIICdgIBADANBg...\n").unwrap();
        assert_eq!(identity.name.as_str(), "Bob");
        assert_eq!(identity.id.as_bytes()[15], 0x0f);
    }

    #[test]
    fn parse_rejects_short_or_bad_files() {
        assert!(matches!(Identity::parse("Bob\n"), Err(ClientError::Identity(_))));
        assert!(matches!(
            Identity::parse("Bob\nnot-hex\n"),
            Err(ClientError::Identity(_))
        ));
    }

    #[test]
    fn missing_file_mentions_register() {
        let dir = tempdir().unwrap();
        let err = Identity::load(&dir.path().join("me.info")).unwrap_err();
        assert!(err.to_string().contains("keyrelay register"));
    }
}
