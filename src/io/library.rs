//! Spectral library loading.
//!
//! The engines only need the models overlapping the observed window, so a
//! [`LibrarySource`] hands back a [`LibrarySubset`] restricted to it. Every
//! failure here is a resource error: without a library there is nothing to
//! search.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::domain::LibrarySubset;
use crate::error::AppError;

pub trait LibrarySource {
    /// Load the models covering `wav_range` (inclusive) from `path`.
    fn load(&self, path: &Path, wav_range: (f64, f64)) -> Result<LibrarySubset, AppError>;
}

/// Library stored as one JSON document `{ "wav": [...], "models": [...] }`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLibrary;

impl LibrarySource for JsonLibrary {
    fn load(&self, path: &Path, wav_range: (f64, f64)) -> Result<LibrarySubset, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::resource(format!("Failed to open library '{}': {e}", path.display())))?;
        let lib: LibrarySubset = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| AppError::resource(format!("Invalid library JSON '{}': {e}", path.display())))?;
        lib.validate()?;

        let (wav_min, wav_max) = wav_range;
        if wav_max < lib.wav[0] || wav_min > lib.wav[lib.wav.len() - 1] {
            return Err(AppError::resource(format!(
                "Library '{}' does not cover {wav_min:.1}-{wav_max:.1} A.",
                path.display()
            )));
        }
        let subset = lib.restrict(wav_min, wav_max);
        subset.validate()?;
        Ok(subset)
    }
}

/// Library already held in memory (synthetic runs); the path is ignored.
#[derive(Debug, Clone)]
pub struct MemoryLibrary(pub LibrarySubset);

impl LibrarySource for MemoryLibrary {
    fn load(&self, _path: &Path, wav_range: (f64, f64)) -> Result<LibrarySubset, AppError> {
        let subset = self.0.restrict(wav_range.0, wav_range.1);
        subset.validate()?;
        Ok(subset)
    }
}

/// Write a library JSON file.
pub fn write_library_json(path: &Path, lib: &LibrarySubset) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::resource(format!("Failed to create library '{}': {e}", path.display())))?;
    serde_json::to_writer(file, lib).map_err(|e| AppError::resource(format!("Failed to write library JSON: {e}")))?;
    Ok(())
}
