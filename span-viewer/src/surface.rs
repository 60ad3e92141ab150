//! File-backed frame surface.
//!
//! Each new frame replaces the JPEG at the configured path. The file is
//! written beside the target and renamed over it, so an image viewer
//! watching the path never sees a half-written frame.

use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::{debug, warn};

use span_core::{Frame, FrameSurface, SessionId, SpanError, Viewport};

pub struct FileSurface {
    path: PathBuf,
    staging: PathBuf,
    viewport: watch::Sender<Option<Viewport>>,
    frames_written: u64,
    lost: Option<SessionId>,
}

impl FileSurface {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let staging = staging_path(&path);
        let (viewport, _) = watch::channel(None);
        Self {
            path,
            staging,
            viewport,
            frames_written: 0,
            lost: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The area of the last frame written, in frame pixels. Console
    /// coordinates are interpreted against it.
    pub fn viewport(&self) -> watch::Receiver<Option<Viewport>> {
        self.viewport.subscribe()
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Set once the relay reports the session gone.
    pub fn lost(&self) -> Option<&SessionId> {
        self.lost.as_ref()
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame".into());
    path.with_file_name(format!(".{name}.partial"))
}

impl FrameSurface for FileSurface {
    fn render(&mut self, frame: &Frame) -> Result<(), SpanError> {
        let write = std::fs::write(&self.staging, &frame.payload)
            .and_then(|()| std::fs::rename(&self.staging, &self.path));
        if let Err(e) = write {
            return Err(SpanError::Encoding(format!(
                "writing frame to {}: {e}",
                self.path.display()
            )));
        }

        self.frames_written += 1;
        self.viewport.send_replace(Some(Viewport::native(frame)));
        debug!(
            ts = frame.source_timestamp,
            width = frame.width,
            height = frame.height,
            bytes = frame.payload.len(),
            "frame written"
        );
        Ok(())
    }

    fn session_lost(&mut self, id: &SessionId) {
        warn!(session = %id, "session not found or expired");
        self.lost = Some(id.clone());
        self.viewport.send_replace(None);
    }
}
