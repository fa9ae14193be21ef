//! Destinations for finished class files

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::Result;

/// Receives each finished class: its dotted name and class file bytes
pub trait ClassOutput {
    fn accept(&mut self, name: &str, bytes: Vec<u8>) -> Result<()>;
}

impl<F> ClassOutput for F
where
    F: FnMut(&str, Vec<u8>) -> Result<()>,
{
    fn accept(&mut self, name: &str, bytes: Vec<u8>) -> Result<()> {
        self(name, bytes)
    }
}

/// Keeps every class in memory, keyed by dotted name
#[derive(Debug, Default, Clone)]
pub struct MemoryOutput {
    classes: BTreeMap<String, Vec<u8>>,
    order: Vec<String>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.classes.get(name).map(Vec::as_slice)
    }

    /// Class names in the order they were produced
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn into_classes(self) -> BTreeMap<String, Vec<u8>> {
        self.classes
    }
}

impl ClassOutput for MemoryOutput {
    fn accept(&mut self, name: &str, bytes: Vec<u8>) -> Result<()> {
        if self.classes.insert(name.to_string(), bytes).is_none() {
            self.order.push(name.to_string());
        }
        Ok(())
    }
}

/// Writes `pkg/Name.class` files under a root directory
#[derive(Debug, Clone)]
pub struct DirectoryOutput {
    root: PathBuf,
}

impl DirectoryOutput {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a class with the given dotted name is written to
    pub fn path_of(&self, name: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in name.split('.') {
            path.push(part);
        }
        path.set_extension("class");
        path
    }
}

impl ClassOutput for DirectoryOutput {
    fn accept(&mut self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_of(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!("writing {}", path.display());
        fs::write(&path, bytes)?;
        Ok(())
    }
}
