// Opaque handles for the foreground render target

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity token for a renderable surface owned by the host UI.
///
/// The service never draws; it only routes the handle to the engine and keys
/// attach/detach bookkeeping off its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceHandle {
    id: u64,
}

impl SurfaceHandle {
    pub fn new() -> Self {
        Self {
            id: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Default for SurfaceHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Properties of the display the surface lives on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayInfo {
    pub width: u32,
    pub height: u32,
    pub refresh_rate_hz: f32,
}
