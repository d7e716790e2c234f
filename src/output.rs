use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
};

use image::{DynamicImage, ImageFormat};
use log::{debug, info, warn};

use crate::{
    error::{CompositeError, Result},
    report::RunReport,
    shadow::CompositeResult,
};

pub const COMPOSITE_FILE: &str = "composite.png";
pub const SHADOW_FILE: &str = "shadow_only.png";
pub const MASK_FILE: &str = "mask_debug.png";
pub const REPORT_FILE: &str = "report.json";

/// Persists a run's images into one directory. Either every file of a
/// `write` call lands under its final name or none does.
pub struct OutputWriter {
    dir: PathBuf,
}

impl OutputWriter {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| CompositeError::OutputWrite {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the composite, shadow and mask images, plus `report.json` when a
    /// report is given. Returns the final paths.
    pub fn write(&self, result: &CompositeResult, report: Option<&RunReport>) -> Result<Vec<PathBuf>> {
        let mut files = vec![
            (COMPOSITE_FILE, encode_png(DynamicImage::ImageRgb8(result.composite.clone()))?),
            (SHADOW_FILE, encode_png(DynamicImage::ImageLuma8(result.shadow_only.clone()))?),
            (MASK_FILE, encode_png(DynamicImage::ImageLuma8(result.mask_debug.clone()))?),
        ];
        if let Some(report) = report {
            files.push((REPORT_FILE, report.to_json()?.into_bytes()));
        }

        self.commit(&files)
    }

    fn commit(&self, files: &[(&str, Vec<u8>)]) -> Result<Vec<PathBuf>> {
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(files.len());

        for (name, bytes) in files {
            let target = self.dir.join(name);
            let temp = self.dir.join(format!(".{name}.partial"));
            if let Err(source) = fs::write(&temp, bytes) {
                let _ = fs::remove_file(&temp);
                discard(&staged);
                return Err(CompositeError::OutputWrite { path: temp, source });
            }
            debug!("Staged {} ({} bytes)", temp.display(), bytes.len());
            staged.push((temp, target));
        }

        let mut committed: Vec<PathBuf> = Vec::with_capacity(staged.len());
        for (i, (temp, target)) in staged.iter().enumerate() {
            if let Err(source) = fs::rename(temp, target) {
                for path in &committed {
                    let _ = fs::remove_file(path);
                }
                discard(&staged[i..]);
                return Err(CompositeError::OutputWrite {
                    path: target.clone(),
                    source,
                });
            }
            committed.push(target.clone());
        }

        info!("Wrote {} files to {}", committed.len(), self.dir.display());
        Ok(committed)
    }
}

fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (temp, _) in staged {
        if let Err(e) = fs::remove_file(temp) {
            warn!("Could not remove {}: {}", temp.display(), e);
        }
    }
}

fn encode_png(image: DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}
