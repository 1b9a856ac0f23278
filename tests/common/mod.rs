//! Stub collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use feedbrief::{
    Collaborators, Config, FeedBrief,
    cache::{KeyValueStore, MemoryStore},
    errors::{AppResult, ModelError, SourceError},
    llm::{LanguageModel, TextStream},
    sources::{PageFetcher, StaticFeedSource},
};

/// Serves canned HTML and image bytes by URL; anything else is a 404
#[derive(Default)]
pub struct CannedPages {
    pub pages: Mutex<HashMap<String, String>>,
    pub images: Mutex<HashMap<String, Vec<u8>>>,
    pub html_requests: AtomicUsize,
    pub image_requests: AtomicUsize,
}

impl CannedPages {
    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), html.to_string());
        self
    }

    pub fn with_image(self, url: &str, bytes: Vec<u8>) -> Self {
        self.images.lock().unwrap().insert(url.to_string(), bytes);
        self
    }
}

#[async_trait]
impl PageFetcher for CannedPages {
    async fn fetch_html(&self, url: &str, _timeout: Duration) -> AppResult<String> {
        self.html_requests.fetch_add(1, Ordering::SeqCst);
        self.pages.lock().unwrap().get(url).cloned().ok_or_else(|| {
            SourceError::Http {
                status: 404,
                url: url.to_string(),
            }
            .into()
        })
    }

    async fn fetch_bytes(
        &self,
        url: &str,
        _headers: &[(String, String)],
        _timeout: Duration,
    ) -> AppResult<Vec<u8>> {
        self.image_requests.fetch_add(1, Ordering::SeqCst);
        self.images.lock().unwrap().get(url).cloned().ok_or_else(|| {
            SourceError::Http {
                status: 404,
                url: url.to_string(),
            }
            .into()
        })
    }
}

/// Language model replaying scripted responses, counting calls
#[derive(Default)]
pub struct CountingModel {
    pub responses: Mutex<VecDeque<String>>,
    pub calls: AtomicUsize,
}

impl CountingModel {
    pub fn scripted(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for CountingModel {
    async fn stream_response(&self, _instructions: &str, _prompt: &str) -> AppResult<TextStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.responses.lock().unwrap().pop_front().ok_or_else(|| {
            ModelError::GenerationFailed {
                message: "no scripted response left".into(),
            }
        })?;
        let words: Vec<String> = response
            .split_inclusive(' ')
            .scan(String::new(), |so_far, word| {
                so_far.push_str(word);
                Some(so_far.clone())
            })
            .collect();
        Ok(Box::pin(stream::iter(words.into_iter().map(Ok))))
    }
}

pub struct Harness {
    pub app: FeedBrief,
    pub feeds: Arc<StaticFeedSource>,
    pub pages: Arc<CannedPages>,
    pub model: Arc<CountingModel>,
    pub store: Arc<dyn KeyValueStore>,
}

pub async fn harness(pages: CannedPages, model: Arc<CountingModel>) -> Harness {
    harness_with(Config::default(), pages, model, Arc::new(MemoryStore::new())).await
}

pub async fn harness_with(
    config: Config,
    pages: CannedPages,
    model: Arc<CountingModel>,
    store: Arc<dyn KeyValueStore>,
) -> Harness {
    let feeds = Arc::new(StaticFeedSource::new());
    let pages = Arc::new(pages);
    let app = FeedBrief::open(
        &config,
        Collaborators {
            feed_source: feeds.clone(),
            page_fetcher: pages.clone(),
            model: model.clone(),
            store: store.clone(),
        },
    )
    .await
    .expect("facade opens");
    Harness {
        app,
        feeds,
        pages,
        model,
        store,
    }
}

/// Article page with boilerplate around two body paragraphs
pub fn article_page(topic: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <head><title>{topic}</title><style>.x {{ color: blue }}</style></head>
  <body>
    <nav><a href="/">Home</a> | <a href="/world">World</a></nav>
    <script>window.analytics = "should-never-appear";</script>
    <p>The first paragraph explains what happened with {topic} this week.</p>
    <p>The second paragraph adds context and quotes about {topic} from officials.</p>
    <footer>Copyright Example News</footer>
  </body>
</html>"#
    )
}

/// Solid-color PNG
pub fn png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("png encodes");
    bytes
}
