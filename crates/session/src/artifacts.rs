//! Files produced next to the recorded episodes: relocation of the
//! temporary recording directory, the optional video and zip archives of
//! exports.

use crate::error::SessionError;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, error, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Name of the video file in the episode directory.
pub const VIDEO_FILE: &str = "video.mjpeg";

/// Copies the contents of `from` into `to`, creating `to` if needed.
pub fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Runs `task` on its own thread. Failures are logged and never reported to
/// the caller.
fn spawn_detached(name: &str, task: impl FnOnce() -> io::Result<()> + Send + 'static) {
    let label = name.to_string();
    let spawned = thread::Builder::new().name(name.into()).spawn(move || {
        if let Err(e) = task() {
            error!("{label} failed: {e}");
        }
    });
    if let Err(e) = spawned {
        error!("Failed to start {name}: {e}");
    }
}

/// Moves the contents of a temporary recording directory to `dest` in the
/// background. The temporary directory is removed afterwards.
pub fn spawn_relocation(dir: TempDir, dest: PathBuf) {
    spawn_detached("episode-relocation", move || {
        copy_dir(dir.path(), &dest)?;
        debug!("Copied {} to {}", dir.path().display(), dest.display());
        dir.close()
    });
}

/// Copies a temporary file to `dest` in the background.
pub fn spawn_file_copy(file: NamedTempFile, dest: PathBuf) {
    spawn_detached("artifact-copy", move || {
        fs::copy(file.path(), &dest)?;
        debug!("Copied {} to {}", file.path().display(), dest.display());
        Ok(())
    });
}

/// Writes every file under `dir` to a zip archive at `archive`, with paths
/// relative to `dir`.
pub fn create_archive(archive: &Path, dir: &Path) -> Result<(), SessionError> {
    let mut zip = ZipWriter::new(BufWriter::new(File::create(archive)?));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    add_to_archive(&mut zip, dir, dir, options)?;
    zip.finish()?.flush()?;
    info!("Created archive {}", archive.display());
    Ok(())
}

fn add_to_archive<W: Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    root: &Path,
    dir: &Path,
    options: FileOptions,
) -> Result<(), SessionError> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(fs::DirEntry::file_name);
    for entry in entries {
        let path = entry.path();
        let name = path
            .strip_prefix(root)
            .map_err(|e| SessionError::Io(io::Error::other(e)))?
            .to_string_lossy()
            .replace('\\', "/");
        if entry.file_type()?.is_dir() {
            zip.add_directory(name, options)?;
            add_to_archive(zip, root, &path, options)?;
        } else {
            zip.start_file(name, options)?;
            io::copy(&mut File::open(&path)?, zip)?;
        }
    }
    Ok(())
}

/// Records the frames shown to the operator as a motion JPEG stream, i.e.
/// the JPEG images back to back.
pub struct VideoRecorder {
    file: NamedTempFile,
    frames: usize,
}

impl VideoRecorder {
    pub fn new() -> io::Result<Self> {
        let file = tempfile::Builder::new().suffix(".mjpeg").tempfile()?;
        info!("Video will be recorded to {}", file.path().display());
        Ok(Self { file, frames: 0 })
    }

    pub fn write_frame(&mut self, jpeg: &[u8]) -> io::Result<()> {
        self.file.write_all(jpeg)?;
        self.frames += 1;
        Ok(())
    }

    #[must_use]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Flushes the stream and returns the file holding it.
    pub fn finish(mut self) -> io::Result<NamedTempFile> {
        self.file.flush()?;
        Ok(self.file)
    }
}
