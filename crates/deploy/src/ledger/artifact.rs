//! Loading creation bytecode from compiled contract artifacts.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::LedgerError;

/// The bytecode field of an artifact, as written by either Truffle
/// (`"bytecode": "0x..."`) or Foundry (`"bytecode": { "object": "0x..." }`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Bytecode {
    Hex(String),
    Object { object: String },
}

#[derive(Debug, Deserialize)]
struct Artifact {
    bytecode: Bytecode,
}

/// A directory of compiled artifacts, one `<Name>.json` per component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    /// Load the creation bytecode of `name`.
    pub fn bytecode(&self, name: &str) -> Result<Vec<u8>, LedgerError> {
        let path = self.artifact_path(name);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            LedgerError::Artifact(format!("failed to read {}: {e}", path.display()))
        })?;
        let artifact: Artifact = serde_json::from_str(&content).map_err(|e| {
            LedgerError::Artifact(format!("failed to parse {}: {e}", path.display()))
        })?;

        let hex_code = match artifact.bytecode {
            Bytecode::Hex(code) => code,
            Bytecode::Object { object } => object,
        };
        let hex_code = hex_code.trim_start_matches("0x");
        if hex_code.is_empty() {
            return Err(LedgerError::Artifact(format!(
                "{} has no creation bytecode (abstract contract or interface?)",
                path.display()
            )));
        }

        hex::decode(hex_code).map_err(|e| {
            LedgerError::Artifact(format!("invalid bytecode in {}: {e}", path.display()))
        })
    }
}
