use crate::error::CaptureError;
use async_trait::async_trait;
use chrono::Utc;
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
const JPEG_QUALITY: u8 = 85;
pub const DEFAULT_CAMERA_TIMEOUT: Duration = Duration::from_secs(10);
/// Placeholder in the camera command replaced with the capture file path.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOrigin {
    Camera,
    Gallery,
}

/// Where an image came from, without its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureInfo {
    pub source_uri: String,
    pub origin: CaptureOrigin,
}

/// A captured or selected image, already normalized to JPEG.
///
/// Not `Clone`: the analysis client takes it by value, so each capture is
/// uploaded at most once.
#[derive(Debug)]
pub struct ImageHandle {
    info: CaptureInfo,
    bytes: Vec<u8>,
}

impl ImageHandle {
    pub fn new(source_uri: impl Into<String>, origin: CaptureOrigin, bytes: Vec<u8>) -> Self {
        Self {
            info: CaptureInfo {
                source_uri: source_uri.into(),
                origin,
            },
            bytes,
        }
    }

    pub fn source_uri(&self) -> &str {
        &self.info.source_uri
    }

    pub fn origin(&self) -> CaptureOrigin {
        self.info.origin
    }

    pub fn info(&self) -> &CaptureInfo {
        &self.info
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn into_parts(self) -> (CaptureInfo, Vec<u8>) {
        (self.info, self.bytes)
    }
}

#[async_trait]
pub trait CaptureSource: Send + Sync {
    async fn request_permission(&self) -> PermissionStatus;
    async fn capture_from_camera(&self) -> Result<ImageHandle, CaptureError>;
    async fn pick_from_gallery(&self) -> Result<ImageHandle, CaptureError>;
}

/// Asks the user for camera access.
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    async fn request(&self) -> PermissionStatus;
}

/// Lets the user choose an existing image. `None` means they backed out.
#[async_trait]
pub trait GalleryPicker: Send + Sync {
    async fn pick(&self) -> Option<PathBuf>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysGrant;

#[async_trait]
impl PermissionPrompt for AlwaysGrant {
    async fn request(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }
}

#[derive(Debug, Default, Clone)]
pub struct FixedGalleryPicker {
    selection: Option<PathBuf>,
}

impl FixedGalleryPicker {
    pub fn new(selection: Option<PathBuf>) -> Self {
        Self { selection }
    }
}

#[async_trait]
impl GalleryPicker for FixedGalleryPicker {
    async fn pick(&self) -> Option<PathBuf> {
        self.selection.clone()
    }
}

/// Camera backed by an external capture command (e.g. `imagesnap {output}`),
/// gallery backed by a [`GalleryPicker`].
pub struct CommandCaptureSource {
    camera_command: Vec<String>,
    capture_dir: PathBuf,
    camera_timeout: Duration,
    prompt: Arc<dyn PermissionPrompt>,
    picker: Arc<dyn GalleryPicker>,
    granted: AtomicBool,
}

impl CommandCaptureSource {
    pub fn new(
        camera_command: Vec<String>,
        capture_dir: impl Into<PathBuf>,
        prompt: Arc<dyn PermissionPrompt>,
        picker: Arc<dyn GalleryPicker>,
    ) -> Self {
        Self {
            camera_command,
            capture_dir: capture_dir.into(),
            camera_timeout: DEFAULT_CAMERA_TIMEOUT,
            prompt,
            picker,
            granted: AtomicBool::new(false),
        }
    }

    pub fn with_camera_timeout(mut self, camera_timeout: Duration) -> Self {
        self.camera_timeout = camera_timeout;
        self
    }

    fn capture_path(&self) -> PathBuf {
        let filename = format!("scan-{}.jpg", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"));
        self.capture_dir.join(filename)
    }

    async fn run_camera(
        &self,
        program: &str,
        args: &[String],
        output_path: &Path,
    ) -> Result<(), CaptureError> {
        let output = output_path.to_string_lossy();
        let mut command = Command::new(program);
        command
            .args(args.iter().map(|arg| arg.replace(OUTPUT_PLACEHOLDER, &output)))
            .kill_on_drop(true);

        let status = timeout(self.camera_timeout, command.status())
            .await
            .map_err(|_| {
                CaptureError::Device(format!(
                    "camera timed out after {:.0}s",
                    self.camera_timeout.as_secs_f32()
                ))
            })?
            .map_err(|err| CaptureError::Device(format!("failed to run {program}: {err}")))?;

        if !status.success() {
            warn!(%status, "camera command failed");
            return Err(CaptureError::Device(format!(
                "{program} exited with status {status}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CaptureSource for CommandCaptureSource {
    async fn request_permission(&self) -> PermissionStatus {
        let status = self.prompt.request().await;
        self.granted.store(status.is_granted(), Ordering::SeqCst);
        debug!(?status, "camera permission resolved");
        status
    }

    async fn capture_from_camera(&self) -> Result<ImageHandle, CaptureError> {
        if !self.granted.load(Ordering::SeqCst) {
            return Err(CaptureError::PermissionDenied);
        }
        let (program, args) = self
            .camera_command
            .split_first()
            .ok_or_else(|| CaptureError::Device("no camera command configured".to_string()))?;

        std::fs::create_dir_all(&self.capture_dir)?;
        let output_path = self.capture_path();
        let loaded = match self.run_camera(program, args, &output_path).await {
            Ok(()) => {
                load_image(&output_path, CaptureOrigin::Camera, camera_uri(&output_path)).await
            }
            Err(err) => Err(err),
        };
        // The bytes live in the handle from here on; nothing stays on disk.
        remove_capture_file(&output_path).await;

        let image = loaded?;
        info!(uri = image.source_uri(), bytes = image.len(), "camera capture ready");
        Ok(image)
    }

    async fn pick_from_gallery(&self) -> Result<ImageHandle, CaptureError> {
        let Some(path) = self.picker.pick().await else {
            debug!("gallery selection cancelled");
            return Err(CaptureError::SelectionCancelled);
        };
        let image = load_image(&path, CaptureOrigin::Gallery, file_uri(&path)).await?;
        info!(uri = image.source_uri(), bytes = image.len(), "gallery image selected");
        Ok(image)
    }
}

async fn load_image(
    path: &Path,
    origin: CaptureOrigin,
    source_uri: String,
) -> Result<ImageHandle, CaptureError> {
    let bytes = tokio::fs::read(path).await?;
    let bytes = normalize_to_jpeg(bytes)?;
    Ok(ImageHandle::new(source_uri, origin, bytes))
}

fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Camera captures are named but not addressable once their file is gone.
fn camera_uri(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("camera://{name}")
}

async fn remove_capture_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "capture file removed"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "failed to remove capture file"),
    }
}

/// Re-encodes any decodable image to JPEG. JPEG and empty input pass through.
pub fn normalize_to_jpeg(bytes: Vec<u8>) -> Result<Vec<u8>, CaptureError> {
    if bytes.is_empty() || bytes.starts_with(&JPEG_MAGIC) {
        return Ok(bytes);
    }

    let decoded = image::load_from_memory(&bytes)
        .map_err(|err| CaptureError::Device(format!("unsupported image data: {err}")))?;
    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());

    let mut encoded = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY))
        .map_err(|err| CaptureError::Device(format!("failed to encode jpeg: {err}")))?;
    Ok(encoded)
}

/// In-memory source for tests and offline demos.
#[derive(Debug, Clone)]
pub struct StaticCaptureSource {
    pub permission: PermissionStatus,
    pub camera_bytes: Option<Vec<u8>>,
    pub gallery_bytes: Option<Vec<u8>>,
}

impl Default for StaticCaptureSource {
    fn default() -> Self {
        Self {
            permission: PermissionStatus::Granted,
            camera_bytes: Some(JPEG_MAGIC.to_vec()),
            gallery_bytes: Some(JPEG_MAGIC.to_vec()),
        }
    }
}

#[async_trait]
impl CaptureSource for StaticCaptureSource {
    async fn request_permission(&self) -> PermissionStatus {
        self.permission
    }

    async fn capture_from_camera(&self) -> Result<ImageHandle, CaptureError> {
        if !self.permission.is_granted() {
            return Err(CaptureError::PermissionDenied);
        }
        self.camera_bytes
            .clone()
            .map(|bytes| ImageHandle::new("memory://camera", CaptureOrigin::Camera, bytes))
            .ok_or_else(|| CaptureError::Device("camera unavailable".to_string()))
    }

    async fn pick_from_gallery(&self) -> Result<ImageHandle, CaptureError> {
        self.gallery_bytes
            .clone()
            .map(|bytes| ImageHandle::new("memory://gallery", CaptureOrigin::Gallery, bytes))
            .ok_or(CaptureError::SelectionCancelled)
    }
}
