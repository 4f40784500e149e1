use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, warn};

use crate::assets::CachedImage;
use crate::assets::decode::decode_image;
use crate::assets::fetch::ImageFetcher;
use crate::foundation::error::{ReCanvasError, ReCanvasResult};

struct LoadDone {
    name: String,
    url: String,
    result: ReCanvasResult<CachedImage>,
}

/// Outcome of a load request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    /// The name was already cached or being loaded; nothing was fetched.
    Skipped,
    /// A blocking load finished and the image is cached.
    Loaded,
    /// A background load was started.
    Started,
}

fn fetch_and_decode(fetcher: &dyn ImageFetcher, url: &str) -> ReCanvasResult<CachedImage> {
    if !fetcher.can_fetch(url) {
        return Err(ReCanvasError::fetch(format!("permission denied: {url}")));
    }
    let bytes = fetcher.fetch(url)?;
    decode_image(&bytes)
}

/// Named images of one sprite canvas. Entries are never evicted.
///
/// Background loads run on their own thread and report back over a channel; finished loads are
/// only inserted when the owner calls [`ImageCache::drain_finished`].
pub struct ImageCache {
    images: HashMap<String, CachedImage>,
    in_flight: HashSet<String>,
    tx: Sender<LoadDone>,
    rx: Receiver<LoadDone>,
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageCache {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            images: HashMap::new(),
            in_flight: HashSet::new(),
            tx,
            rx,
        }
    }

    pub fn get(&self, name: &str) -> Option<&CachedImage> {
        self.images.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, image: CachedImage) {
        self.images.insert(name.into(), image);
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn is_in_flight(&self, name: &str) -> bool {
        self.in_flight.contains(name)
    }

    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    fn is_known(&self, name: &str) -> bool {
        self.images.contains_key(name) || self.in_flight.contains(name)
    }

    /// Fetch and decode on the calling thread.
    ///
    /// If a background load of `name` is in flight, waits for it instead of fetching again; should
    /// that load fail, the fetch is retried here. Failures are returned and the name stays
    /// uncached so a later call may retry.
    pub fn load_blocking(
        &mut self,
        name: &str,
        url: &str,
        fetcher: &dyn ImageFetcher,
    ) -> ReCanvasResult<LoadStatus> {
        if self.in_flight.contains(name) {
            self.wait_for(name);
        }
        if self.images.contains_key(name) {
            return Ok(LoadStatus::Skipped);
        }
        let image = fetch_and_decode(fetcher, url)?;
        debug!(name, url, width = image.width, height = image.height, "image loaded");
        self.images.insert(name.to_string(), image);
        Ok(LoadStatus::Loaded)
    }

    /// Start a background fetch and decode.
    pub fn load_async(
        &mut self,
        name: &str,
        url: &str,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> ReCanvasResult<LoadStatus> {
        if self.is_known(name) {
            return Ok(LoadStatus::Skipped);
        }
        let tx = self.tx.clone();
        let (job_name, job_url) = (name.to_string(), url.to_string());
        std::thread::Builder::new()
            .name("recanvas-load".to_string())
            .spawn(move || {
                let result = fetch_and_decode(fetcher.as_ref(), &job_url);
                // The cache may already be gone.
                let _ = tx.send(LoadDone {
                    name: job_name,
                    url: job_url,
                    result,
                });
            })
            .map_err(|e| ReCanvasError::host(format!("spawn image loader: {e}")))?;
        self.in_flight.insert(name.to_string());
        Ok(LoadStatus::Started)
    }

    fn finish(&mut self, done: LoadDone) {
        self.in_flight.remove(&done.name);
        match done.result {
            Ok(image) => {
                debug!(name = %done.name, url = %done.url, "image loaded in background");
                self.images.insert(done.name, image);
            }
            Err(e) => warn!(name = %done.name, url = %done.url, error = %e, "image load failed"),
        }
    }

    /// Insert every finished background load. Returns how many loads completed.
    pub fn drain_finished(&mut self) -> usize {
        let done: Vec<LoadDone> = self.rx.try_iter().collect();
        let n = done.len();
        for d in done {
            self.finish(d);
        }
        n
    }

    /// Block until the background load of `name` has finished.
    fn wait_for(&mut self, name: &str) {
        while self.in_flight.contains(name) {
            match self.rx.recv() {
                Ok(done) => self.finish(done),
                Err(_) => break,
            }
        }
    }

    /// Block until every background load has finished.
    pub fn wait_pending(&mut self) {
        while !self.in_flight.is_empty() {
            match self.rx.recv() {
                Ok(done) => self.finish(done),
                Err(_) => break,
            }
        }
    }
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("images", &self.images.keys().collect::<Vec<_>>())
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    const SVG: &[u8] =
        br#"<svg xmlns="http://www.w3.org/2000/svg" width="2" height="2"><rect width="2" height="2"/></svg>"#;

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        deny: bool,
        delay_ms: u64,
    }

    impl ImageFetcher for Counting {
        fn can_fetch(&self, _url: &str) -> bool {
            !self.deny
        }

        fn fetch(&self, _url: &str) -> ReCanvasResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(self.delay_ms));
            Ok(SVG.to_vec())
        }
    }

    #[test]
    fn blocking_load_fetches_once_per_name() {
        let fetcher = Counting::default();
        let mut cache = ImageCache::new();
        assert_eq!(cache.load_blocking("a", "x", &fetcher).unwrap(), LoadStatus::Loaded);
        assert_eq!(cache.load_blocking("a", "y", &fetcher).unwrap(), LoadStatus::Skipped);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("a").unwrap().width, 2);
    }

    #[test]
    fn async_load_is_deduplicated_while_in_flight() {
        let fetcher = Arc::new(Counting::default());
        let mut cache = ImageCache::new();
        assert_eq!(
            cache.load_async("a", "x", fetcher.clone()).unwrap(),
            LoadStatus::Started
        );
        assert_eq!(
            cache.load_async("a", "x", fetcher.clone()).unwrap(),
            LoadStatus::Skipped
        );
        assert!(cache.is_in_flight("a"));
        cache.wait_pending();
        assert!(cache.get("a").is_some());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn denied_fetch_is_an_error_without_calling_fetch() {
        let fetcher = Counting {
            deny: true,
            ..Default::default()
        };
        let mut cache = ImageCache::new();
        let err = cache.load_blocking("a", "x", &fetcher).unwrap_err();
        assert!(matches!(err, ReCanvasError::Fetch(_)));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn failed_async_load_clears_in_flight() {
        let fetcher = Arc::new(Counting {
            deny: true,
            ..Default::default()
        });
        let mut cache = ImageCache::new();
        cache.load_async("a", "x", fetcher).unwrap();
        cache.wait_pending();
        assert_eq!(cache.pending(), 0);
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn blocking_load_waits_for_in_flight_load_of_same_name() {
        let fetcher = Arc::new(Counting {
            delay_ms: 200,
            ..Default::default()
        });
        let mut cache = ImageCache::new();
        cache.load_async("a", "x", fetcher.clone()).unwrap();
        let status = cache.load_blocking("a", "x", fetcher.as_ref()).unwrap();
        assert_eq!(status, LoadStatus::Skipped);
        assert!(cache.get("a").is_some());
        assert!(!cache.is_in_flight("a"));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn blocking_load_retries_after_failed_background_load() {
        struct FailOnce(AtomicUsize);
        impl ImageFetcher for FailOnce {
            fn fetch(&self, _url: &str) -> ReCanvasResult<Vec<u8>> {
                if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ReCanvasError::fetch("flaky"))
                } else {
                    Ok(SVG.to_vec())
                }
            }
        }
        let fetcher = Arc::new(FailOnce(AtomicUsize::new(0)));
        let mut cache = ImageCache::new();
        cache.load_async("a", "x", fetcher.clone()).unwrap();
        let status = cache.load_blocking("a", "x", fetcher.as_ref()).unwrap();
        assert_eq!(status, LoadStatus::Loaded);
        assert_eq!(fetcher.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn names_with_nul_bytes_load_in_background() {
        let fetcher = Arc::new(Counting::default());
        let mut cache = ImageCache::new();
        assert_eq!(
            cache.load_async("a\0b", "x", fetcher).unwrap(),
            LoadStatus::Started
        );
        cache.wait_pending();
        assert!(cache.get("a\0b").is_some());
    }
}
