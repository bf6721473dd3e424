//! Image resizing collaborator.
//!
//! The cache only needs "turn this source into that destination at this
//! size". [`ImageResizer`] is that seam; [`FfmpegResizer`] is the production
//! implementation, a one-frame ffmpeg run with a scale filter.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error};

#[async_trait]
pub trait ImageResizer: Send + Sync {
    /// Write `source` scaled to `width` (and `height`, or aspect-preserving
    /// when absent) into `dest`. Returns the written path, or `None` when
    /// nothing was produced.
    async fn resize(&self, source: &Path, dest: &Path, width: u32, height: Option<u32>) -> Option<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct FfmpegResizer {
    ffmpeg_path: PathBuf,
}

impl FfmpegResizer {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

/// Output format is picked by ffmpeg from the destination extension.
fn ffmpeg_args(source: &Path, dest: &Path, width: u32, height: Option<u32>) -> Vec<OsString> {
    let scale = match height {
        Some(h) => format!("scale={width}:{h}"),
        None => format!("scale={width}:-1"),
    };
    vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        source.as_os_str().to_owned(),
        "-vf".into(),
        scale.into(),
        "-frames:v".into(),
        "1".into(),
        dest.as_os_str().to_owned(),
    ]
}

#[async_trait]
impl ImageResizer for FfmpegResizer {
    async fn resize(&self, source: &Path, dest: &Path, width: u32, height: Option<u32>) -> Option<PathBuf> {
        debug!(source = %source.display(), dest = %dest.display(), width, ?height, "Resizing image");

        let output = Command::new(&self.ffmpeg_path)
            .args(ffmpeg_args(source, dest, width, height))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                if tokio::fs::try_exists(dest).await.unwrap_or(false) {
                    Some(dest.to_path_buf())
                } else {
                    error!(dest = %dest.display(), "ffmpeg exited cleanly but wrote nothing");
                    None
                }
            }
            Ok(out) => {
                error!(
                    status = %out.status,
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    source = %source.display(),
                    "ffmpeg resize failed"
                );
                None
            }
            Err(e) => {
                error!(error = %e, ffmpeg = %self.ffmpeg_path.display(), "Failed to run ffmpeg");
                None
            }
        }
    }
}
