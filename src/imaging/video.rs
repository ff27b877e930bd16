//! Animated raster → MP4 conversion through an external `ffmpeg`.
//!
//! The output is H.264 in yuv420p with the moov atom up front, so browsers
//! can start playing before the download finishes. yuv420p needs even
//! dimensions; odd-sized sources are trimmed by one pixel.
//!
//! ffmpeg writes to a temp file next to the final name and the result is
//! renamed into place, so conversions of the same source can overlap.

use super::backend::{BackendError, VideoConverter};
use crate::naming::{OutputLayout, hash_bytes, video_file_name};
use crate::resolve::ResolvedPath;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Lines of ffmpeg stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 5;

#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    program: String,
    layout: OutputLayout,
}

impl FfmpegConverter {
    pub fn new(program: &str, layout: OutputLayout) -> Self {
        Self {
            program: program.to_string(),
            layout,
        }
    }
}

/// Arguments turning `source` into a web-friendly MP4 at `output`.
pub fn ffmpeg_args(source: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-i"].iter().map(OsString::from).collect();
    args.push(source.as_os_str().to_owned());
    args.extend(
        [
            "-movflags",
            "+faststart",
            "-pix_fmt",
            "yuv420p",
            "-vf",
            "scale=trunc(iw/2)*2:trunc(ih/2)*2",
        ]
        .iter()
        .map(OsString::from),
    );
    args.push(output.as_os_str().to_owned());
    args
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join(" | ")
}

#[async_trait]
impl VideoConverter for FfmpegConverter {
    async fn convert(&self, source: &ResolvedPath) -> Result<String, BackendError> {
        let input = source.on_disk(self.layout.root());
        let bytes = tokio::fs::read(&input).await?;
        let name = video_file_name(&hash_bytes(&bytes));
        tokio::fs::create_dir_all(self.layout.dir_path()).await?;
        let output_path = self.layout.file_path(&name);
        // ffmpeg picks the container from the extension
        let staging = tempfile::Builder::new()
            .prefix(".imgdim-")
            .suffix(".mp4")
            .tempfile_in(self.layout.dir_path())?;

        debug!(program = %self.program, source = %input.display(), output = %output_path.display(), "converting to video");
        let output = Command::new(&self.program)
            .args(ffmpeg_args(&input, staging.path()))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BackendError::Process {
                program: self.program.clone(),
                detail: format!("could not start: {e}"),
            })?;

        if !output.status.success() {
            return Err(BackendError::Process {
                program: self.program.clone(),
                detail: format!("{}: {}", output.status, stderr_tail(&output.stderr)),
            });
        }
        staging
            .persist(&output_path)
            .map_err(|e| BackendError::Io(e.error))?;
        Ok(self.layout.url(&name))
    }
}
