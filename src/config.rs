//! Generation settings shared by the lowering engine and the class file backend

use crate::backend::classfile::major_versions;

/// Default element count at which collection constants move into the per-class resource blob
pub const DEFAULT_RESOURCE_CONSTANT_THRESHOLD: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Class file major version written into every generated class
    pub target_version: u16,
    /// Compute and emit the StackMapTable attribute
    pub emit_frames: bool,
    /// Emit LineNumberTable / LocalVariableTable / LocalVariableTypeTable
    pub debug: bool,
    /// Collection literals with at least this many elements use the resource strategy
    pub resource_constant_threshold: usize,
    /// Optional SourceFile attribute for the primary class
    pub source_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_version: major_versions::JAVA_11,
            emit_frames: true,
            debug: true,
            resource_constant_threshold: DEFAULT_RESOURCE_CONSTANT_THRESHOLD,
            source_file: None,
        }
    }
}

impl Config {
    /// Default settings overlaid with `CLASSMAKER_*` environment switches
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_flag("CLASSMAKER_DEBUG") {
            config.debug = v;
        }
        if let Some(v) = env_flag("CLASSMAKER_EMIT_FRAMES") {
            config.emit_frames = v;
        }
        if let Ok(v) = std::env::var("CLASSMAKER_TARGET") {
            match v.trim().parse::<u16>() {
                Ok(major) => config.target_version = major,
                Err(_) => log::warn!("ignoring CLASSMAKER_TARGET={v:?}: not a class file major version"),
            }
        }
        if let Ok(v) = std::env::var("CLASSMAKER_RESOURCE_THRESHOLD") {
            match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.resource_constant_threshold = n,
                _ => log::warn!("ignoring CLASSMAKER_RESOURCE_THRESHOLD={v:?}"),
            }
        }
        config
    }

    /// Whether the target version requires a StackMapTable for every method with branches
    pub fn requires_frames(&self) -> bool {
        self.target_version >= major_versions::JAVA_7
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            log::warn!("ignoring {name}={other:?}: expected a boolean");
            None
        }
    }
}
