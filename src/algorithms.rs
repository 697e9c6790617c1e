//! FPGA algorithm lookup
//!
//! Bitstreams are plain files named `<NAME>.alg` in one directory.

use std::fs;
use std::path::{Path, PathBuf};

use minipro_core::{AlgorithmSource, Error, Result};

/// Directory of algorithm bitstreams
pub struct AlgorithmDir {
    root: PathBuf,
}

impl AlgorithmDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.alg", name))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AlgorithmSource for AlgorithmDir {
    fn algorithm(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path(name);
        log::debug!("Loading algorithm from {}", path.display());
        let bytes = fs::read(&path)
            .map_err(|e| Error::Bitstream(format!("{}: {}", path.display(), e)))?;
        if bytes.is_empty() {
            return Err(Error::Bitstream(format!("{} is empty", path.display())));
        }
        Ok(bytes)
    }
}
