use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::backend::error::Result;

/// Token pair persisted for one remote service
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TokenDocument {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenDocument {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Flat JSON file holding a single [`TokenDocument`]
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the saved document. A corrupt file counts as missing.
    pub fn load(&self) -> Option<TokenDocument> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return None,
        };

        match serde_json::from_str(&content) {
            Ok(document) => Some(document),
            Err(e) => {
                log::warn!("Ignoring unreadable token file {:?}: {}", self.path, e);
                None
            }
        }
    }

    /// Replace the whole document; readers never observe a partial write.
    pub fn save(&self, document: &TokenDocument) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let content = serde_json::to_string_pretty(document)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        log::debug!("Token document written to {:?}", self.path);
        Ok(())
    }
}
