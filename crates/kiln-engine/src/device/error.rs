use wgpu::SurfaceError;

/// High-level response after a surface error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; frame-scoped resources must be rebuilt.
    Reconfigured,
    /// Transient error; skip the current frame.
    SkipFrame,
    /// The device cannot make progress; terminate gracefully.
    Fatal,
}

impl SurfaceErrorAction {
    /// Classifies an acquisition failure.
    ///
    /// A timed-out acquire is treated as a hung device, not as a transient
    /// hiccup.
    pub fn classify(err: &SurfaceError) -> Self {
        match err {
            SurfaceError::Lost | SurfaceError::Outdated => SurfaceErrorAction::Reconfigured,
            SurfaceError::Timeout | SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
            SurfaceError::Other => SurfaceErrorAction::SkipFrame,
        }
    }
}
