//! Latest high-resolution still, hot-swapped without blocking readers

use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwapOption;
use bytes::Bytes;

use crate::error::CaptureError;

/// One captured still. Length is always `bytes.len()`, so the pair can
/// never disagree.
#[derive(Debug, Clone)]
pub struct CachedStill {
    pub bytes: Bytes,
    pub captured_at: SystemTime,
}

impl CachedStill {
    pub fn new(bytes: Bytes) -> Self {
        Self {
            bytes,
            captured_at: SystemTime::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Single-slot store for the most recent still.
///
/// Writers swap in a whole new `Arc`, so a reader sees either the old or the
/// new still, never a mix. The previous still is dropped once the swap is
/// visible and the last in-flight reader lets go of it.
#[derive(Default)]
pub struct LatestCapture {
    slot: ArcSwapOption<CachedStill>,
}

impl LatestCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Private copy of the current still, `None` before the first refresh.
    pub fn read(&self) -> Result<Option<CachedStill>, CaptureError> {
        let Some(current) = self.slot.load_full() else {
            return Ok(None);
        };
        Ok(Some(CachedStill {
            bytes: copy_bytes(&current.bytes)?,
            captured_at: current.captured_at,
        }))
    }

    /// Swap in a new still, returning the one it replaced
    pub fn replace(&self, still: CachedStill) -> Option<Arc<CachedStill>> {
        self.slot.swap(Some(Arc::new(still)))
    }

    /// Size and capture time of the current still without copying it
    pub fn peek(&self) -> Option<(usize, SystemTime)> {
        self.slot
            .load()
            .as_ref()
            .map(|still| (still.len(), still.captured_at))
    }
}

/// Copy `src` into a fresh buffer, reporting allocation failure instead of
/// aborting.
pub(crate) fn copy_bytes(src: &[u8]) -> Result<Bytes, CaptureError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(src.len())
        .map_err(|_| CaptureError::Allocation { len: src.len() })?;
    buf.extend_from_slice(src);
    Ok(Bytes::from(buf))
}
