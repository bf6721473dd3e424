//! On-disk cache of resized cover and entity images.
//!
//! The filesystem is the index: a cached image exists iff the file at its
//! key path exists. Keys are `<entityId>_<width>[x<height>].<format>` under
//! `covers/` (library item covers) or `images/` (authors and other
//! entities). Nothing is evicted; files go away only when their owner is
//! purged or the whole cache is dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::future::join_all;
use lectern_store::LibraryItem;
use serde::Deserialize;
use tokio::fs::{self, File};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ServerError;
use crate::resize::ImageResizer;

const DEFAULT_FORMAT: &str = "webp";
const DEFAULT_WIDTH: u32 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// Library item covers.
    Cover,
    /// Author photos and other entity images.
    Image,
}

impl ImageKind {
    fn dir_name(self) -> &'static str {
        match self {
            ImageKind::Cover => "covers",
            ImageKind::Image => "images",
        }
    }
}

/// Requested rendition. Zero width or height counts as not given.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageOptions {
    pub format: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rendition {
    format: String,
    width: u32,
    height: Option<u32>,
}

impl ImageOptions {
    fn resolve(&self) -> Result<Rendition, ServerError> {
        let format = self
            .format
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_FORMAT)
            .to_ascii_lowercase();
        if !format.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ServerError::BadRequest(format!("Invalid image format: {format}")));
        }
        Ok(Rendition {
            format,
            width: self.width.filter(|w| *w > 0).unwrap_or(DEFAULT_WIDTH),
            height: self.height.filter(|h| *h > 0),
        })
    }
}

impl Rendition {
    fn file_name(&self, entity_id: &str) -> String {
        match self.height {
            Some(h) => format!("{entity_id}_{}x{h}.{}", self.width, self.format),
            None => format!("{entity_id}_{}.{}", self.width, self.format),
        }
    }

    fn content_type(&self) -> String {
        format!("image/{}", self.format)
    }
}

/// Entity ids become file name prefixes, so anything that could leave the
/// cache directory (or match every file) is refused.
fn validate_entity_id(entity_id: &str) -> Result<(), ServerError> {
    if entity_id.is_empty()
        || entity_id.starts_with('.')
        || entity_id.contains('/')
        || entity_id.contains('\\')
        || entity_id.contains("..")
    {
        return Err(ServerError::BadRequest(format!("Invalid entity id: {entity_id:?}")));
    }
    Ok(())
}

async fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove partial resize output");
        }
    }
}

/// A cached image ready to be sent.
#[derive(Debug)]
pub enum ServedImage {
    /// Hand the file to the reverse proxy.
    Redirect { location: String, content_type: String },
    /// Stream the file ourselves.
    Stream { file: File, len: u64, content_type: String },
}

impl ServedImage {
    async fn open(path: &Path, content_type: String, x_accel: Option<&str>) -> Result<Self, ServerError> {
        if let Some(prefix) = x_accel {
            let location = format!("{prefix}{}", path.display());
            debug!(location = %location, "Use X-Accel to serve static file");
            return Ok(ServedImage::Redirect { location, content_type });
        }
        let file = File::open(path).await?;
        let len = file.metadata().await?.len();
        Ok(ServedImage::Stream { file, len, content_type })
    }

    pub fn content_type(&self) -> &str {
        match self {
            ServedImage::Redirect { content_type, .. } | ServedImage::Stream { content_type, .. } => content_type,
        }
    }
}

impl IntoResponse for ServedImage {
    fn into_response(self) -> Response {
        let content_type = HeaderValue::from_str(self.content_type())
            .unwrap_or(HeaderValue::from_static("application/octet-stream"));

        match self {
            ServedImage::Redirect { location, .. } => match HeaderValue::from_str(&location) {
                Ok(location) => (
                    StatusCode::NO_CONTENT,
                    [(header::CONTENT_TYPE, content_type), (header::HeaderName::from_static("x-accel-redirect"), location)],
                )
                    .into_response(),
                Err(_) => ServerError::Internal(format!("Unrepresentable redirect path: {location}")).into_response(),
            },
            ServedImage::Stream { file, len, .. } => {
                let body = Body::from_stream(tokio_util::io::ReaderStream::new(file));
                (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, content_type), (header::CONTENT_LENGTH, HeaderValue::from(len))],
                    body,
                )
                    .into_response()
            }
        }
    }
}

/// Resized image cache shared by the image routes.
///
/// The item cover and author image routes of the embedding library server
/// call [`ImageCache::serve_cover`] or [`ImageCache::serve`] and return the
/// resulting [`ServedImage`] as their response. The bundled API only exposes
/// account and scan routes.
pub struct ImageCache {
    cache_path: PathBuf,
    covers_path: PathBuf,
    images_path: PathBuf,
    items_path: PathBuf,
    x_accel: Option<String>,
    resizer: Arc<dyn ImageResizer>,
}

impl ImageCache {
    /// Create the cache rooted at `cache_path`, making sure its directory
    /// skeleton exists.
    pub async fn new(
        cache_path: PathBuf,
        x_accel: Option<String>,
        resizer: Arc<dyn ImageResizer>,
    ) -> Result<Self, ServerError> {
        let cache = Self {
            covers_path: cache_path.join("covers"),
            images_path: cache_path.join("images"),
            items_path: cache_path.join("items"),
            cache_path,
            x_accel,
            resizer,
        };
        cache.ensure_cache_paths().await?;
        info!(path = %cache.cache_path.display(), "Image cache initialized");
        Ok(cache)
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn items_path(&self) -> &Path {
        &self.items_path
    }

    fn kind_path(&self, kind: ImageKind) -> &Path {
        match kind {
            ImageKind::Cover => &self.covers_path,
            ImageKind::Image => &self.images_path,
        }
    }

    /// Idempotently create the cache root and its `covers/`, `images/` and
    /// `items/` subdirectories.
    pub async fn ensure_cache_paths(&self) -> Result<(), ServerError> {
        for dir in [&self.cache_path, &self.covers_path, &self.images_path, &self.items_path] {
            fs::create_dir_all(dir).await.map_err(|e| {
                error!(path = %dir.display(), error = %e, "Failed to create cache directory");
                ServerError::Io(e)
            })?;
        }
        Ok(())
    }

    /// Path a rendition of `entity_id` is cached at.
    pub fn cache_file_path(&self, kind: ImageKind, entity_id: &str, options: &ImageOptions) -> Result<PathBuf, ServerError> {
        validate_entity_id(entity_id)?;
        let rendition = options.resolve()?;
        Ok(self.kind_path(kind).join(rendition.file_name(entity_id)))
    }

    /// Serve the cached rendition, producing it from `source` on a miss.
    pub async fn serve(
        &self,
        kind: ImageKind,
        entity_id: &str,
        source: Option<&Path>,
        options: &ImageOptions,
    ) -> Result<ServedImage, ServerError> {
        validate_entity_id(entity_id)?;
        let rendition = options.resolve()?;
        let file_name = rendition.file_name(entity_id);
        let path = self.kind_path(kind).join(&file_name);

        if fs::try_exists(&path).await? {
            return ServedImage::open(&path, rendition.content_type(), self.x_accel.as_deref()).await;
        }

        let source_exists = match source {
            Some(source) => fs::try_exists(source).await.unwrap_or(false),
            None => false,
        };
        let Some(source) = source.filter(|_| source_exists) else {
            warn!(entity_id, source = ?source, "Image source missing, cannot fill cache");
            return Err(ServerError::SourceUnavailable(source.map(Path::to_path_buf).unwrap_or_default()));
        };

        // Readers only ever see a complete file: the resizer writes a hidden
        // sibling which is renamed into place. Two concurrent misses may both
        // resize; the last rename wins.
        let temp_path = self
            .kind_path(kind)
            .join(format!(".{}_{file_name}", Uuid::new_v4().simple()));
        let Some(written) = self
            .resizer
            .resize(source, &temp_path, rendition.width, rendition.height)
            .await
        else {
            remove_partial(&temp_path).await;
            return Err(ServerError::ResizeFailed(path));
        };
        if let Err(e) = fs::rename(&written, &path).await {
            error!(from = %written.display(), to = %path.display(), error = %e, "Failed to move resized image into place");
            remove_partial(&written).await;
            return Err(e.into());
        }
        debug!(entity_id, path = %path.display(), "Cached resized image");

        ServedImage::open(&path, rendition.content_type(), self.x_accel.as_deref()).await
    }

    /// Serve a library item's cover from its `coverPath`.
    pub async fn serve_cover(&self, item: &LibraryItem, options: &ImageOptions) -> Result<ServedImage, ServerError> {
        self.serve(ImageKind::Cover, &item.id, item.media.cover_path.as_deref().map(Path::new), options)
            .await
    }

    /// Remove every cached file of `kind` whose name starts with `entity_id`.
    /// Returns the removed paths; failures are logged and skipped.
    pub async fn purge_by_owner(&self, kind: ImageKind, entity_id: &str) -> Result<Vec<PathBuf>, ServerError> {
        validate_entity_id(entity_id)?;
        let dir = self.kind_path(kind);

        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut targets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(entity_id) {
                debug!(file = %entry.path().display(), "Going to purge cached image");
                targets.push(entry.path());
            }
        }

        let removals = targets.into_iter().map(|path| async move {
            match fs::remove_file(&path).await {
                Ok(()) => Some(path),
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to remove cached image");
                    None
                }
            }
        });
        Ok(join_all(removals).await.into_iter().flatten().collect())
    }

    pub async fn purge_cover_cache(&self, library_item_id: &str) -> Result<Vec<PathBuf>, ServerError> {
        self.purge_by_owner(ImageKind::Cover, library_item_id).await
    }

    pub async fn purge_image_cache(&self, entity_id: &str) -> Result<Vec<PathBuf>, ServerError> {
        self.purge_by_owner(ImageKind::Image, entity_id).await
    }

    /// Drop the whole cache, then recreate the empty skeleton.
    pub async fn purge_all(&self) -> Result<(), ServerError> {
        info!(path = %self.cache_path.display(), "Purging all cache");
        remove_tree(&self.cache_path).await;
        self.ensure_cache_paths().await
    }

    /// Drop the `items/` subtree, then recreate the skeleton.
    pub async fn purge_items(&self) -> Result<(), ServerError> {
        info!(path = %self.items_path.display(), "Purging items cache");
        remove_tree(&self.items_path).await;
        self.ensure_cache_paths().await
    }
}

async fn remove_tree(path: &Path) {
    match fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => error!(path = %path.display(), error = %e, "Failed to remove cache dir"),
    }
}
