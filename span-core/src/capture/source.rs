//! Host screen capture.
//!
//! [`ScreenSource`] is the capability seam: the pipeline only ever asks a
//! source for the next raw frame. On Windows, [`GdiCapturer`] grabs the
//! primary display with GDI `BitBlt`. On other platforms construction
//! fails with [`SpanError::CaptureUnavailable`] and the agent registers
//! without the capture capability.

use crate::capture::types::RawScreenFrame;
use crate::error::SpanError;

/// Anything that can produce raw screen frames.
pub trait ScreenSource: Send {
    /// Grab the current screen contents.
    fn grab(&mut self) -> Result<RawScreenFrame, SpanError>;
}

impl<S: ScreenSource + ?Sized> ScreenSource for Box<S> {
    fn grab(&mut self) -> Result<RawScreenFrame, SpanError> {
        (**self).grab()
    }
}

/// GDI screen grabber for the primary display.
pub struct GdiCapturer {
    _private: (),
}

// ── Windows implementation ───────────────────────────────────────

#[cfg(target_os = "windows")]
mod platform {
    use super::*;
    use crate::capture::types::PixelFormat;
    use windows::Win32::Foundation::HWND;
    use windows::Win32::Graphics::Gdi::*;
    use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

    impl GdiCapturer {
        /// Open the desktop; fails if no display is attached to this session.
        pub fn new() -> Result<Self, SpanError> {
            let (w, h) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
            if w <= 0 || h <= 0 {
                return Err(SpanError::CaptureUnavailable(
                    "no interactive desktop in this session".into(),
                ));
            }
            Ok(Self { _private: () })
        }
    }

    impl ScreenSource for GdiCapturer {
        fn grab(&mut self) -> Result<RawScreenFrame, SpanError> {
            unsafe { grab_primary() }
        }
    }

    unsafe fn grab_primary() -> Result<RawScreenFrame, SpanError> {
        let width = unsafe { GetSystemMetrics(SM_CXSCREEN) };
        let height = unsafe { GetSystemMetrics(SM_CYSCREEN) };
        if width <= 0 || height <= 0 {
            return Err(SpanError::CaptureUnavailable("GetSystemMetrics returned 0".into()));
        }

        let desktop = HWND::default();
        let screen_dc = unsafe { GetDC(desktop) };
        if screen_dc.is_invalid() {
            return Err(SpanError::CaptureUnavailable("GetDC failed".into()));
        }

        let mem_dc = unsafe { CreateCompatibleDC(screen_dc) };
        let bitmap = unsafe { CreateCompatibleBitmap(screen_dc, width, height) };
        let previous = unsafe { SelectObject(mem_dc, bitmap) };

        let blit = unsafe { BitBlt(mem_dc, 0, 0, width, height, screen_dc, 0, 0, SRCCOPY) };

        let mut info = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: width,
                // Negative height = top-down rows.
                biHeight: -height,
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut data = vec![0u8; width as usize * height as usize * 4];
        let lines = unsafe {
            GetDIBits(
                mem_dc,
                bitmap,
                0,
                height as u32,
                Some(data.as_mut_ptr().cast()),
                &mut info,
                DIB_RGB_COLORS,
            )
        };

        unsafe {
            SelectObject(mem_dc, previous);
            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(mem_dc);
            ReleaseDC(desktop, screen_dc);
        }

        blit.map_err(|e| SpanError::CaptureUnavailable(format!("BitBlt failed: {e}")))?;
        if lines == 0 {
            return Err(SpanError::CaptureUnavailable("GetDIBits copied no rows".into()));
        }

        Ok(RawScreenFrame::packed(
            width as u32,
            height as u32,
            PixelFormat::Bgra8,
            data,
        ))
    }
}

// ── Non-Windows stub ─────────────────────────────────────────────

#[cfg(not(target_os = "windows"))]
impl GdiCapturer {
    pub fn new() -> Result<Self, SpanError> {
        Err(SpanError::CaptureUnavailable(
            "screen capture is only implemented for Windows".into(),
        ))
    }
}

#[cfg(not(target_os = "windows"))]
impl ScreenSource for GdiCapturer {
    fn grab(&mut self) -> Result<RawScreenFrame, SpanError> {
        Err(SpanError::CaptureUnavailable("not supported on this platform".into()))
    }
}
