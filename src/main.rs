//! Capture client: wires the V4L2 engine to the lifecycle coordinator.

use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{debug, info};

use vidcap::{Coordinator, PixelEncoding, V4l2CaptureEngine, VideoFormat};

/// Device probed when `--device` is not given.
const DEFAULT_DEVICE: &str = "/dev/video0";

#[derive(Debug, Parser)]
#[command(name = "vidcap", about = "Continuous raw-frame capture from a V4L2 device")]
struct Args {
    /// Capture device path (probes /dev/video0 when omitted).
    #[arg(long)]
    device: Option<PathBuf>,

    /// Frame width in pixels.
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Frame height in pixels.
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Target frame rate in frames per second.
    #[arg(long, default_value_t = 30.0)]
    fps: f32,

    /// Pixel encoding requested from the device.
    #[arg(long, default_value = "I420")]
    encoding: PixelEncoding,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let device = match args.device {
        Some(path) => path,
        None => resolve_device_path().context("no capture device found")?,
    };
    let format = VideoFormat::new(args.encoding, args.width, args.height, args.fps, device);
    info!(%format, "starting capture client");

    let mut coordinator = Coordinator::new();
    coordinator
        .spawn_signal_manager(&[SIGINT, SIGTERM])
        .context("signal manager setup failed")?;
    coordinator
        .spawn_capture(V4l2CaptureEngine::new(), format)
        .context("capture thread setup failed")?;

    while !coordinator.is_stop_requested() {
        thread::sleep(Duration::from_millis(200));
    }
    info!("shutting down");
    coordinator.shutdown();
    Ok(())
}

/// Probe the default capture device location.
fn resolve_device_path() -> Result<PathBuf> {
    let path = PathBuf::from(DEFAULT_DEVICE);
    let metadata = fs::metadata(&path)
        .with_context(|| format!("capture device {DEFAULT_DEVICE} does not exist"))?;
    if !metadata.file_type().is_char_device() {
        bail!("{DEFAULT_DEVICE} is not a character device");
    }
    debug!(device = DEFAULT_DEVICE, "resolved default capture device");
    Ok(path)
}
