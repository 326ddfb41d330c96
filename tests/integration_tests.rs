use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use marketing_vision::*;

/// Scripted provider with atomic probes for call counts and overlap.
struct MockProvider {
    delay: Duration,
    failing: AtomicBool,
    calls: AtomicUsize,
    current: AtomicUsize,
    max_concurrent: AtomicUsize,
}

impl MockProvider {
    fn ok() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            current: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
        })
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

impl AnalysisProvider for MockProvider {
    async fn analyze(&self, _payload: &[u8]) -> Result<AnalysisResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.current.fetch_sub(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            // Same failure an empty body produces
            Err(parse_analysis("").unwrap_err())
        } else {
            Ok(result_fixture())
        }
    }
}

fn result_fixture() -> AnalysisResult {
    AnalysisResult {
        taglines: vec!["Catch the light".into(), "Bold by design".into()],
        keywords: vec![
            KeywordMetadata {
                word: "sunset".into(),
                relevance: 92,
                platforms: vec![Platform::AdobeStock, Platform::Freepik],
            },
            KeywordMetadata {
                word: "beach".into(),
                relevance: 40,
                platforms: vec![Platform::Shutterstock],
            },
            KeywordMetadata {
                word: "golden hour".into(),
                relevance: 85,
                platforms: vec![Platform::AdobeStock],
            },
        ],
        description: "Warm evening light.".into(),
        suggested_platforms: vec!["Instagram".into()],
    }
}

fn png_image(name: &str) -> RawImage {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        16,
        16,
        image::Rgb([80, 90, 100]),
    ));
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
    RawImage::new(cursor.into_inner(), "image/png").with_name(name)
}

fn submit_n(engine: &BatchEngine<Arc<MockProvider>>, count: usize) -> Vec<ItemId> {
    let images = (0..count).map(|i| png_image(&format!("{}.png", i))).collect();
    engine
        .submit(images)
        .into_iter()
        .map(|r| r.unwrap())
        .collect()
}

// -- Intake --

#[test]
fn test_submit_rejects_non_image_without_creating_item() {
    let provider = MockProvider::ok();
    let engine = BatchEngine::new(provider);

    let outcomes = engine.submit(vec![
        png_image("a.png"),
        png_image("b.png"),
        RawImage::new(b"hello".to_vec(), "text/plain").with_name("notes.txt"),
    ]);

    assert!(outcomes[0].is_ok());
    assert!(outcomes[1].is_ok());
    assert!(matches!(outcomes[2], Err(IntakeError::InvalidInput(_))));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.iter().all(|i| i.status == ItemStatus::Pending));
}

#[test]
fn test_submit_prepends_newest_batch_first() {
    let engine = BatchEngine::new(MockProvider::ok());
    let first = submit_n(&engine, 1);
    let second = submit_n(&engine, 2);

    let ids: Vec<ItemId> = engine.snapshot().iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![second[0], second[1], first[0]]);
}

#[test]
fn test_submit_capture_accepts_single_frame() {
    let engine = BatchEngine::new(MockProvider::ok());
    let id = engine.submit_capture(png_image("frame.jpg")).unwrap();
    assert_eq!(engine.get(id).unwrap().status, ItemStatus::Pending);
}

// -- Batch runs --

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_process_all_completes_every_item() {
    let provider = MockProvider::with_delay(Duration::from_millis(10));
    let engine = BatchEngine::new(Arc::clone(&provider));
    submit_n(&engine, 7);

    engine.process_all().await;

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.len(), 7);
    assert!(snapshot.iter().all(|i| i.status == ItemStatus::Completed));
    assert!(snapshot.iter().all(|i| i.result.is_some() && i.error.is_none()));
    assert_eq!(provider.calls(), 7);
    assert!(!engine.is_batch_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrency_never_exceeds_limit() {
    let provider = MockProvider::with_delay(Duration::from_millis(30));
    let engine = BatchEngine::new(Arc::clone(&provider));
    submit_n(&engine, 12);

    engine.process_all().await;

    assert_eq!(provider.calls(), 12);
    assert!(
        provider.max_concurrent() <= CONCURRENCY_LIMIT,
        "observed {} overlapping calls",
        provider.max_concurrent()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_second_process_all_is_ignored_while_running() {
    let provider = MockProvider::with_delay(Duration::from_millis(150));
    let engine = BatchEngine::new(Arc::clone(&provider));
    submit_n(&engine, 2);

    let runner = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.process_all().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.is_batch_running());

    // Returns immediately without interleaving a second run
    engine.process_all().await;

    runner.await.unwrap();
    assert_eq!(provider.calls(), 2);
    assert!(!engine.is_batch_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_noop_process_all_leaves_snapshot_identical() {
    let engine = BatchEngine::new(MockProvider::ok());
    submit_n(&engine, 2);
    engine.process_all().await;

    let before = engine.snapshot();
    engine.process_all().await; // nothing eligible
    let after = engine.snapshot();
    assert_eq!(before, after);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_partial_failure_isolation() {
    let provider = MockProvider::ok();
    let engine = BatchEngine::new(Arc::clone(&provider));
    let ids = submit_n(&engine, 3);

    // Fail only the middle item by running it alone while failing
    provider.set_failing(true);
    engine.analyze_one(ids[1]).await;
    provider.set_failing(false);
    engine.process_all().await;

    assert_eq!(engine.get(ids[0]).unwrap().status, ItemStatus::Completed);
    // Error item was eligible again and recovered during the batch run
    assert_eq!(engine.get(ids[1]).unwrap().status, ItemStatus::Completed);
    assert_eq!(engine.get(ids[2]).unwrap().status, ItemStatus::Completed);
}

// -- Single-item runs --

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_flight_per_item() {
    let provider = MockProvider::with_delay(Duration::from_millis(100));
    let engine = BatchEngine::new(Arc::clone(&provider));
    let ids = submit_n(&engine, 1);

    let (e1, e2) = (engine.clone(), engine.clone());
    let id = ids[0];
    tokio::join!(e1.analyze_one(id), e2.analyze_one(id));

    assert_eq!(provider.calls(), 1, "duplicate in-flight analysis");
    assert_eq!(engine.get(id).unwrap().status, ItemStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_error_then_rerun_clears_error() {
    let provider = MockProvider::ok();
    let engine = BatchEngine::new(Arc::clone(&provider));
    let ids = submit_n(&engine, 1);
    let id = ids[0];

    provider.set_failing(true);
    engine.analyze_one(id).await;
    let item = engine.get(id).unwrap();
    assert_eq!(item.status, ItemStatus::Error);
    let message = item.error.unwrap();
    assert!(message.contains("Malformed"), "got: {}", message);
    assert!(item.result.is_none());

    provider.set_failing(false);
    engine.analyze_one(id).await;
    let item = engine.get(id).unwrap();
    assert_eq!(item.status, ItemStatus::Completed);
    assert!(item.error.is_none());
    assert!(item.result.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_completed_item_is_not_rerun() {
    let provider = MockProvider::ok();
    let engine = BatchEngine::new(Arc::clone(&provider));
    let ids = submit_n(&engine, 1);

    engine.analyze_one(ids[0]).await;
    engine.analyze_one(ids[0]).await;

    assert_eq!(provider.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_removal_mid_flight_discards_write() {
    let provider = MockProvider::with_delay(Duration::from_millis(150));
    let engine = BatchEngine::new(Arc::clone(&provider));
    let ids = submit_n(&engine, 1);
    let id = ids[0];

    let runner = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.analyze_one(id).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(engine.get(id).unwrap().status, ItemStatus::Processing);

    engine.remove(id);
    runner.await.unwrap();

    assert_eq!(provider.calls(), 1);
    assert!(engine.get(id).is_none());
    assert!(engine.snapshot().is_empty());
}

// -- Keyword selection --

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_toggle_keyword_round_trips() {
    let engine = BatchEngine::new(MockProvider::ok());
    let ids = submit_n(&engine, 1);
    let id = ids[0];
    engine.analyze_one(id).await;

    engine.toggle_keyword(id, "sunset");
    assert!(engine.selected_keywords(id).contains("sunset"));

    engine.toggle_keyword(id, "sunset");
    assert!(engine.selected_keywords(id).is_empty());

    engine.toggle_keyword(id, "sunset");
    assert!(engine.selected_keywords(id).contains("sunset"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_toggle_rejects_word_outside_result() {
    let engine = BatchEngine::new(MockProvider::ok());
    let ids = submit_n(&engine, 1);
    engine.analyze_one(ids[0]).await;

    engine.toggle_keyword(ids[0], "unrelated");
    assert!(engine.selected_keywords(ids[0]).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_select_all_keeps_only_result_words() {
    let engine = BatchEngine::new(MockProvider::ok());
    let ids = submit_n(&engine, 1);
    let id = ids[0];
    engine.analyze_one(id).await;

    engine.select_all(id, ["sunset", "fabricated"]);
    let selected = engine.selected_keywords(id);
    assert_eq!(selected.len(), 1);
    assert!(selected.contains("sunset"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_select_filtered_selects_exactly_the_view() {
    let engine = BatchEngine::new(MockProvider::ok());
    let ids = submit_n(&engine, 1);
    let id = ids[0];
    engine.analyze_one(id).await;

    let filter = KeywordFilter::default().platform(Platform::AdobeStock);
    engine.select_filtered(id, &filter);

    let selected = engine.selected_keywords(id);
    assert_eq!(selected.len(), 2);
    assert!(selected.contains("sunset"));
    assert!(selected.contains("golden hour"));
    assert!(!selected.contains("beach"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_selection_purged_with_item() {
    let engine = BatchEngine::new(MockProvider::ok());
    let ids = submit_n(&engine, 2);
    engine.process_all().await;

    engine.toggle_keyword(ids[0], "sunset");
    engine.toggle_keyword(ids[1], "beach");

    engine.remove(ids[0]);
    assert!(engine.selected_keywords(ids[0]).is_empty());
    assert_eq!(engine.selected_words(), vec!["beach"]);
}

// -- Cleanup --

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_clear_all_releases_every_preview_and_selection() {
    let engine = BatchEngine::new(MockProvider::ok());
    let ids = submit_n(&engine, 3);
    engine.process_all().await;
    engine.toggle_keyword(ids[0], "sunset");

    let probes: Vec<_> = ids
        .iter()
        .map(|&id| engine.preview_probe(id).unwrap())
        .collect();
    assert!(probes.iter().all(|p| !p.is_released()));

    engine.clear_all();

    assert!(engine.snapshot().is_empty());
    assert!(engine.selected_words().is_empty());
    assert!(probes.iter().all(|p| p.is_released()));
}

#[test]
fn test_preview_bytes_available_for_display() {
    let engine = BatchEngine::new(MockProvider::ok());
    let ids = submit_n(&engine, 1);
    let bytes = engine.preview_bytes(ids[0]).unwrap();
    // JPEG SOI marker
    assert_eq!(&bytes[..2], &[0xff, 0xd8]);
}
