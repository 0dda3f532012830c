use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use super::table::Protocol;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid protocol definition {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Unsupported base build {0}: no protocol definition")]
    UnknownBuild(u32),
    #[error("Invalid protocol {build}: {reason}")]
    Invalid { build: u32, reason: String },
}

/// Protocol definitions indexed by base build.
///
/// Definitions live in a directory as `protocol<build>.json` files. Opening
/// the registry only indexes file names; each definition is parsed the first
/// time its build is requested and then shared between threads.
#[derive(Debug, Default)]
pub struct ProtocolRegistry {
    paths: BTreeMap<u32, PathBuf>,
    loaded: RwLock<HashMap<u32, Arc<Protocol>>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, ProtocolError> {
        let mut paths = BTreeMap::new();

        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            let Some(build) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_build)
            else {
                continue;
            };
            paths.insert(build, path);
        }

        log::debug!(
            "indexed {} protocol definitions in {}",
            paths.len(),
            dir.as_ref().display()
        );

        Ok(Self {
            paths,
            loaded: RwLock::new(HashMap::new()),
        })
    }

    /// Registers an already parsed protocol, replacing any indexed file for
    /// the same build.
    pub fn insert(&self, protocol: Protocol) -> Result<Arc<Protocol>, ProtocolError> {
        protocol.validate().map_err(|reason| ProtocolError::Invalid {
            build: protocol.build,
            reason,
        })?;

        let protocol = Arc::new(protocol);
        self.loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(protocol.build, protocol.clone());
        Ok(protocol)
    }

    pub fn builds(&self) -> Vec<u32> {
        let loaded = self.loaded.read().unwrap_or_else(PoisonError::into_inner);
        let mut builds: Vec<u32> = self.paths.keys().chain(loaded.keys()).copied().collect();
        builds.sort_unstable();
        builds.dedup();
        builds
    }

    pub fn latest(&self) -> Option<u32> {
        self.builds().last().copied()
    }

    pub fn contains(&self, build: u32) -> bool {
        self.paths.contains_key(&build)
            || self
                .loaded
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(&build)
    }

    pub fn get(&self, build: u32) -> Result<Arc<Protocol>, ProtocolError> {
        if let Some(protocol) = self
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&build)
        {
            return Ok(protocol.clone());
        }

        let path = self
            .paths
            .get(&build)
            .ok_or(ProtocolError::UnknownBuild(build))?;

        let data = std::fs::read(path)?;
        let protocol = Protocol::from_json(&data).map_err(|source| ProtocolError::Json {
            path: path.clone(),
            source,
        })?;

        if protocol.build != build {
            return Err(ProtocolError::Invalid {
                build,
                reason: format!("{} declares build {}", path.display(), protocol.build),
            });
        }

        log::debug!("loaded protocol {build} from {}", path.display());

        self.insert(protocol)
    }
}

/// File name the registry indexes for `build`.
pub fn definition_file_name(build: u32) -> String {
    format!("protocol{build}.json")
}

fn parse_build(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix("protocol")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_build_from_file_name() {
        assert_eq!(parse_build("protocol80949.json"), Some(80949));
        assert_eq!(parse_build("protocol80949.py"), None);
        assert_eq!(parse_build("protocolX.json"), None);
        assert_eq!(parse_build("readme.json"), None);
        assert_eq!(parse_build(&definition_file_name(80949)), Some(80949));
    }

    #[test]
    fn unknown_build() {
        let registry = ProtocolRegistry::new();
        assert!(registry.latest().is_none());
        assert!(matches!(
            registry.get(1),
            Err(ProtocolError::UnknownBuild(1))
        ));
    }
}
