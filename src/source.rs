use std::fmt::Display;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

pub const REPLAY_EXTENSION: &str = ".SC2Replay";
pub const PACK_EXTENSION: &str = ".zip";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Where a replay's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaySource {
    File(PathBuf),
    Packed { pack: PathBuf, entry: String },
}

impl ReplaySource {
    pub fn load(&self) -> Result<Vec<u8>, SourceError> {
        match self {
            ReplaySource::File(path) => Ok(std::fs::read(path)?),
            ReplaySource::Packed { pack, entry } => {
                let mut archive = zip::ZipArchive::new(BufReader::new(File::open(pack)?))?;
                let mut file = archive.by_name(entry)?;

                let mut data = Vec::new();
                file.read_to_end(&mut data)?;
                Ok(data)
            }
        }
    }
}

impl Display for ReplaySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplaySource::File(path) => write!(f, "{}", path.display()),
            ReplaySource::Packed { pack, entry } => {
                write!(f, "{entry} from {}", pack.display())
            }
        }
    }
}

fn files_with_suffix<'a>(root: &Path, suffix: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                log::warn!("Skipping unreadable path: {err}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(move |entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(suffix))
        })
        .map(|entry| entry.into_path())
}

/// Lists the replay entries of a replay pack.
pub fn pack_entries(pack: &Path) -> Result<Vec<String>, SourceError> {
    let archive = zip::ZipArchive::new(BufReader::new(File::open(pack)?))?;

    Ok(archive
        .file_names()
        .filter(|name| name.ends_with(REPLAY_EXTENSION))
        .map(str::to_string)
        .collect())
}

/// Finds every replay under `root`: first the contents of replay packs, then
/// standalone replay files. Packs that cannot be opened are skipped.
pub fn discover(root: &Path) -> Vec<ReplaySource> {
    let mut sources = Vec::new();

    for pack in files_with_suffix(root, PACK_EXTENSION) {
        match pack_entries(&pack) {
            Ok(entries) => sources.extend(entries.into_iter().map(|entry| ReplaySource::Packed {
                pack: pack.clone(),
                entry,
            })),
            Err(err) => log::warn!("Failed to open {}. Skipped ({err})", pack.display()),
        }
    }

    sources.extend(files_with_suffix(root, REPLAY_EXTENSION).map(ReplaySource::File));
    sources
}

pub fn count_replays<P: AsRef<Path>>(paths: &[P]) -> usize {
    paths.iter().map(|p| discover(p.as_ref()).len()).sum()
}
