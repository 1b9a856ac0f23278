//! Thumbnail cache: image URL -> downscaled JPEG plus dominant color
//!
//! Entries are timestamped on insertion and the cache is bounded by count.
//! When a save pushes the count over capacity, the oldest entries by
//! insertion timestamp are evicted until the count is back at capacity.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, TimeDelta, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::store::KeyValueStore;
use crate::config::{CacheConfig, ThumbnailDownloadConfig};
use crate::errors::{AppError, AppResult, CacheError, CacheResult, SourceError};
use crate::models::{Rgb, ThumbnailImage};
use crate::sources::PageFetcher;
use crate::utils::debounce::{Debouncer, Flush};
use crate::utils::url::UrlUtils;

const ACCEPT_IMAGES: &str = "image/avif,image/webp,image/apng,image/*,*/*;q=0.8";

mod base64_bytes {
    use super::BASE64;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ThumbnailEntry {
    #[serde(with = "base64_bytes")]
    bytes: Vec<u8>,
    inserted_at: DateTime<Utc>,
    /// Missing on entries written before colors were computed eagerly
    #[serde(default)]
    color: Option<Rgb>,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

impl ThumbnailEntry {
    fn image(&self) -> ThumbnailImage {
        ThumbnailImage {
            bytes: self.bytes.clone(),
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug, Default)]
struct ThumbnailState {
    entries: HashMap<String, ThumbnailEntry>,
    last_inserted_at: Option<DateTime<Utc>>,
}

impl ThumbnailState {
    /// Wall-clock time, nudged forward so insertion order is strict
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_inserted_at
            && now <= last
        {
            now = last + TimeDelta::microseconds(1);
        }
        self.last_inserted_at = Some(now);
        now
    }

    /// Drop oldest-by-timestamp entries until at most `capacity` remain
    fn evict_over(&mut self, capacity: usize) -> usize {
        let overflow = self.entries.len().saturating_sub(capacity);
        if overflow == 0 {
            return 0;
        }
        let mut by_age: Vec<(DateTime<Utc>, String)> = self
            .entries
            .iter()
            .map(|(url, entry)| (entry.inserted_at, url.clone()))
            .collect();
        by_age.sort();
        for (_, url) in by_age.into_iter().take(overflow) {
            self.entries.remove(&url);
        }
        overflow
    }
}

struct ThumbnailInner {
    state: Mutex<ThumbnailState>,
    /// Held across snapshot and persist so flushes land in order
    flush_lock: tokio::sync::Mutex<()>,
    store: Arc<dyn KeyValueStore>,
    store_key: String,
}

impl ThumbnailInner {
    fn state(&self) -> MutexGuard<'_, ThumbnailState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Flush for ThumbnailInner {
    async fn flush(&self) {
        let _writing = self.flush_lock.lock().await;
        let snapshot = {
            let state = self.state();
            serde_json::to_vec(&state.entries)
        };
        match snapshot {
            Ok(bytes) => {
                if let Err(e) = self.store.persist(&self.store_key, &bytes).await {
                    warn!("Failed to persist thumbnail cache: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize thumbnail cache: {}", e),
        }
    }
}

/// Average color of the lower half of `img`.
///
/// Returns `None` for images without pixels; callers then fall back to
/// [`single_pixel_color`].
pub fn average_lower_half(img: &DynamicImage) -> Option<Rgb> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    let rgb = img.to_rgb8();
    let start = height / 2;
    let (mut r, mut g, mut b, mut n) = (0u64, 0u64, 0u64, 0u64);
    for y in start..height {
        for x in 0..width {
            let px = rgb.get_pixel(x, y);
            r += u64::from(px[0]);
            g += u64::from(px[1]);
            b += u64::from(px[2]);
            n += 1;
        }
    }
    if n == 0 {
        return None;
    }
    Some(Rgb::new((r / n) as u8, (g / n) as u8, (b / n) as u8))
}

/// Whole image scaled down to one pixel
pub fn single_pixel_color(img: &DynamicImage) -> Option<Rgb> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    let pixel = img.resize_exact(1, 1, FilterType::Triangle).to_rgb8();
    let px = pixel.get_pixel(0, 0);
    Some(Rgb::new(px[0], px[1], px[2]))
}

/// Dominant color used behind thumbnails
pub fn dominant_color(img: &DynamicImage) -> Option<Rgb> {
    average_lower_half(img).or_else(|| single_pixel_color(img))
}

/// Downscale so neither side exceeds `max_dimension`; smaller images are kept as-is
fn downscale(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width <= max_dimension && height <= max_dimension {
        return img;
    }
    img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> CacheResult<Vec<u8>> {
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    img.to_rgb8().write_with_encoder(encoder)?;
    Ok(bytes)
}

/// Thumbnail ready to insert: resized, encoded and colored
struct PreparedThumbnail {
    bytes: Vec<u8>,
    color: Option<Rgb>,
    width: u32,
    height: u32,
}

/// CPU-bound part of saving; callers on the runtime run it via `spawn_blocking`
fn prepare(image: DynamicImage, max_dimension: u32, quality: u8) -> CacheResult<PreparedThumbnail> {
    let resized = downscale(image, max_dimension);
    let color = dominant_color(&resized);
    let bytes = encode_jpeg(&resized, quality)?;
    let (width, height) = resized.dimensions();
    Ok(PreparedThumbnail {
        bytes,
        color,
        width,
        height,
    })
}

/// Persistent, size-bounded thumbnail cache
pub struct ThumbnailCache {
    inner: Arc<ThumbnailInner>,
    debouncer: Debouncer,
    capacity: usize,
    max_dimension: u32,
    quality: u8,
    download: ThumbnailDownloadConfig,
    fetcher: Arc<dyn PageFetcher>,
}

impl ThumbnailCache {
    pub async fn load(
        store: Arc<dyn KeyValueStore>,
        store_key: &str,
        cache_config: &CacheConfig,
        download: ThumbnailDownloadConfig,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        let capacity = cache_config.thumbnail_capacity.max(1);
        let entries: HashMap<String, ThumbnailEntry> = match store.load(store_key).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("Discarding unreadable thumbnail cache: {}", e);
                HashMap::new()
            }),
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!("Failed to load thumbnail cache: {}", e);
                HashMap::new()
            }
        };

        let mut state = ThumbnailState {
            last_inserted_at: entries.values().map(|e| e.inserted_at).max(),
            entries,
        };
        let evicted = state.evict_over(capacity);
        info!(
            "Thumbnail cache loaded: {} entries (evicted {})",
            state.entries.len(),
            evicted
        );

        let inner = Arc::new(ThumbnailInner {
            state: Mutex::new(state),
            flush_lock: tokio::sync::Mutex::new(()),
            store,
            store_key: store_key.to_string(),
        });
        let debouncer = Debouncer::spawn("thumbnails", cache_config.flush_debounce, inner.clone());
        if evicted > 0 {
            debouncer.mark_dirty();
        }

        Self {
            inner,
            debouncer,
            capacity,
            max_dimension: cache_config.thumbnail_max_dimension.max(1),
            quality: cache_config.thumbnail_quality.clamp(1, 100),
            download,
            fetcher,
        }
    }

    /// Downscale, compress and store `image` under `url`
    pub fn save(&self, image: DynamicImage, url: &str) -> CacheResult<Option<Rgb>> {
        let prepared = prepare(image, self.max_dimension, self.quality)?;
        Ok(self.insert(url, prepared))
    }

    fn insert(&self, url: &str, prepared: PreparedThumbnail) -> Option<Rgb> {
        let PreparedThumbnail {
            bytes,
            color,
            width,
            height,
        } = prepared;
        let evicted = {
            let mut state = self.inner.state();
            let inserted_at = state.next_timestamp();
            state.entries.insert(
                url.to_string(),
                ThumbnailEntry {
                    bytes,
                    inserted_at,
                    color,
                    width,
                    height,
                },
            );
            state.evict_over(self.capacity)
        };
        if evicted > 0 {
            debug!("Thumbnail cache over capacity, evicted {} oldest", evicted);
        }
        self.debouncer.mark_dirty();
        color
    }

    /// Decode encoded image bytes and prepare them on the blocking pool
    pub async fn save_encoded(&self, encoded: Vec<u8>, url: &str) -> CacheResult<Option<Rgb>> {
        let (max_dimension, quality) = (self.max_dimension, self.quality);
        let prepared = tokio::task::spawn_blocking(move || -> CacheResult<PreparedThumbnail> {
            let image = image::load_from_memory(&encoded)?;
            prepare(image, max_dimension, quality)
        })
        .await
        .map_err(|e| CacheError::store(url, e.to_string()))??;
        Ok(self.insert(url, prepared))
    }

    pub fn load_image(&self, url: &str) -> Option<ThumbnailImage> {
        self.inner.state().entries.get(url).map(ThumbnailEntry::image)
    }

    /// Image plus its dominant color, computing and storing the color for
    /// entries that were cached without one
    pub fn load_with_color(&self, url: &str) -> Option<(ThumbnailImage, Rgb)> {
        let entry = self.inner.state().entries.get(url).cloned()?;
        if let Some(color) = entry.color {
            return Some((entry.image(), color));
        }

        let decoded = match image::load_from_memory(&entry.bytes) {
            Ok(img) => img,
            Err(e) => {
                warn!("Cached thumbnail for {} is undecodable: {}", url, e);
                return None;
            }
        };
        let color = dominant_color(&decoded)?;
        if let Some(stored) = self.inner.state().entries.get_mut(url) {
            stored.color = Some(color);
        }
        self.debouncer.mark_dirty();
        Some((entry.image(), color))
    }

    pub fn contains(&self, url: &str) -> bool {
        self.inner.state().entries.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.inner.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// URLs currently cached, oldest first
    pub fn urls_by_age(&self) -> Vec<String> {
        let state = self.inner.state();
        let mut by_age: Vec<(&DateTime<Utc>, &String)> = state
            .entries
            .iter()
            .map(|(url, entry)| (&entry.inserted_at, url))
            .collect();
        by_age.sort();
        by_age.into_iter().map(|(_, url)| url.clone()).collect()
    }

    pub fn clear(&self) {
        self.inner.state().entries.clear();
        self.debouncer.mark_dirty();
    }

    pub async fn flush(&self) {
        self.debouncer.clear_dirty();
        self.inner.flush().await;
    }

    fn request_headers(&self, url: &str) -> Vec<(String, String)> {
        let mut headers = vec![
            ("User-Agent".to_string(), self.download.user_agent.clone()),
            (
                "Accept-Language".to_string(),
                self.download.accept_language.clone(),
            ),
            ("Accept".to_string(), ACCEPT_IMAGES.to_string()),
        ];
        let referer = self
            .download
            .referer
            .clone()
            .or_else(|| UrlUtils::origin(url));
        if let Some(referer) = referer {
            headers.push(("Referer".to_string(), referer));
        }
        headers
    }

    /// Fetch and cache `url` unless it is a vector image or already cached.
    ///
    /// Returns `Ok(true)` when a new entry was stored. Each attempt uses its
    /// own timeout from `retry_timeouts`; attempts are separated by
    /// `retry_delay`.
    pub async fn download_and_cache(&self, url: &str) -> AppResult<bool> {
        if UrlUtils::is_vector_image(url) {
            debug!("Skipping vector thumbnail {}", url);
            return Ok(false);
        }
        if self.contains(url) {
            return Ok(false);
        }

        let headers = self.request_headers(url);
        let mut last_error: Option<AppError> = None;
        for (attempt, timeout) in self.download.retry_timeouts.iter().enumerate() {
            if attempt > 0 {
                tokio::time::sleep(self.download.retry_delay).await;
            }
            match self.fetcher.fetch_bytes(url, &headers, *timeout).await {
                Ok(bytes) => {
                    self.save_encoded(bytes, url).await?;
                    debug!(
                        "Cached thumbnail {} after {} attempt(s)",
                        UrlUtils::obfuscate_credentials(url),
                        attempt + 1
                    );
                    return Ok(true);
                }
                Err(AppError::Source(SourceError::UnsupportedFormat { format, url })) => {
                    debug!("Skipping {} thumbnail {}", format, url);
                    return Ok(false);
                }
                Err(e) => {
                    debug!(
                        "Thumbnail attempt {} for {} failed: {}",
                        attempt + 1,
                        UrlUtils::obfuscate_credentials(url),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AppError::from(CacheError::store(url, "no download attempts configured"))
        }))
    }
}
