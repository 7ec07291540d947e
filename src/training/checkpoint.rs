use std::{
    fs,
    path::{Path, PathBuf},
};

use log::info;

use super::{Predictor, Result, TrainError};

/// The single live "latest" checkpoint.
///
/// `version` counts commits made by this process only; it is not stored in the
/// file, so a resumed run starts again from zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSlot {
    path: PathBuf,
    version: u64,
}

impl CheckpointSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            version: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Overwrites the checkpoint with `predictor`'s current state.
    pub fn commit<P: Predictor>(&mut self, predictor: &P) -> Result<u64> {
        replace_atomically(&self.path, |tmp| predictor.save_checkpoint(tmp))?;
        self.version += 1;
        info!(
            "Saved checkpoint v{} to {}",
            self.version,
            self.path.display()
        );
        Ok(self.version)
    }
}

/// Overwrites the portable export consumed by the next round's self-play.
pub fn export_predictor<P: Predictor>(predictor: &P, path: &Path) -> Result<()> {
    replace_atomically(path, |tmp| predictor.export(tmp))?;
    info!("Exported predictor to {}", path.display());
    Ok(())
}

/// Writes to a hidden sibling and renames it over `path`, so readers never see
/// a half-written file.
fn replace_atomically(
    path: &Path,
    write: impl FnOnce(&Path) -> anyhow::Result<()>,
) -> Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent).map_err(|e| TrainError::io(parent, e))?;
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| TrainError::InvalidConfig(format!("{} is not a file path", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.partial", file_name.to_string_lossy()));

    if let Err(e) = write(&tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(TrainError::Predictor(e));
    }
    fs::rename(&tmp, path).map_err(|e| TrainError::io(path, e))
}
