use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use v4l::{capability::Flags, video::Capture, Device, FourCC};

// Detected capture device info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoundDevice {
    pub path: String,
    pub card: String,
}

impl FoundDevice {
    pub fn new(path: String, card: String) -> Self {
        Self { path, card }
    }
}

/// Find the first capture device that can hand out MJPEG frames.
///
/// Frames are served as-is, so devices offering only raw formats are skipped.
pub async fn auto_detect_device() -> Result<FoundDevice> {
    use std::path::Path;

    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }

        if let Ok(formats) = dev.enum_formats() {
            if formats.iter().any(|fmt| fmt.fourcc == FourCC::new(b"MJPG")) {
                info!("Found MJPEG device: {} - {}", path, caps.card);
                return Ok(FoundDevice::new(path, caps.card));
            }
            debug!("Skipping {}: no MJPEG output", path);
        }
    }

    Err(eyre!("No MJPEG capture device found"))
}
