//! End-to-end pipeline runs over in-memory collaborators.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use binwatch_media::{ClipSource, MediaResult, VideoHandle};
use binwatch_ml_client::{OverflowLabel, OverflowVerdict};
use binwatch_models::{
    BoundingBox, ClassificationMethod, ConfidenceTier, DetectionRecord, Event, EventType,
    SamplingDisposition, VideoId, VideoSummary,
};
use binwatch_worker::{
    FrameVerdict, HybridClassifier, OverflowClassifier, Pipeline, PipelineConfig, PreparedVideo,
    RunLogger, VisionClassifier, VlmResponse, WorkerResult,
};

/// Pretends every clip already exists.
struct StaticClips;

#[async_trait]
impl ClipSource for StaticClips {
    async fn extract(
        &self,
        event: &Event,
        video: &VideoHandle,
        _clip_duration_seconds: f64,
        _pad_before_seconds: f64,
    ) -> MediaResult<PathBuf> {
        Ok(PathBuf::from(format!(
            "clips/{}/event_{:03}.mp4",
            video.video_id, event.event_id
        )))
    }
}

struct AlwaysLabel(OverflowLabel);

#[async_trait]
impl OverflowClassifier for AlwaysLabel {
    async fn classify(&self, _frame: &Path, _threshold: f32) -> WorkerResult<OverflowVerdict> {
        Ok(OverflowVerdict {
            label: self.0,
            probability: 0.9,
        })
    }
}

/// Full on the first and last representative frame, not full in between.
struct FullAtEnds {
    calls: AtomicUsize,
}

#[async_trait]
impl OverflowClassifier for FullAtEnds {
    async fn classify(&self, _frame: &Path, _threshold: f32) -> WorkerResult<OverflowVerdict> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) % 3;
        let label = if call == 1 {
            OverflowLabel::NotFull
        } else {
            OverflowLabel::Full
        };
        Ok(OverflowVerdict {
            label,
            probability: 0.7,
        })
    }
}

struct CountingVision {
    per_call_cost: f64,
    calls: AtomicUsize,
}

impl CountingVision {
    fn new(per_call_cost: f64) -> Arc<Self> {
        Arc::new(Self {
            per_call_cost,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionClassifier for CountingVision {
    fn estimate_cost(&self, _frames: &[PathBuf]) -> f64 {
        self.per_call_cost
    }

    async fn classify(
        &self,
        frames: &[PathBuf],
        _taxonomy: &[EventType],
        _context: &str,
    ) -> WorkerResult<VlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(VlmResponse {
            frame_verdicts: frames
                .iter()
                .map(|_| FrameVerdict {
                    event_type: EventType::MissedCollection,
                    confidence: ConfidenceTier::Medium,
                })
                .collect(),
            description: "No arm reaches the bin".to_string(),
        })
    }
}

fn video(duration: f64) -> PreparedVideo {
    PreparedVideo {
        summary: VideoSummary {
            video_id: VideoId::from_string("street"),
            source: "street.mp4".to_string(),
            duration,
            fps: 30.0,
            width: 1280,
            height: 720,
            sample_rate_hz: 1.0,
        },
        path: PathBuf::from("street.mp4"),
    }
}

/// 1 Hz stream with bins on the listed frames.
fn stream(total: u64, bins: &[u64]) -> Vec<DetectionRecord> {
    (0..total)
        .map(|i| {
            let boxes = if bins.contains(&i) {
                vec![BoundingBox::new(100.0, 200.0, 180.0, 340.0, 0.82)]
            } else {
                vec![]
            };
            DetectionRecord::from_boxes(i, i as f64, boxes, 0.5)
                .with_frame_path(format!("/frames/street/frame_{:06}.jpg", i))
        })
        .collect()
}

/// `count` separate three-frame runs, four empty frames apart.
fn separated_runs(count: u64) -> (u64, Vec<u64>) {
    let bins = (0..count).flat_map(|k| (7 * k)..(7 * k + 3)).collect();
    (7 * count, bins)
}

fn logger() -> RunLogger {
    RunLogger::new("test-run", "street")
}

#[tokio::test]
async fn two_bin_runs_yield_two_events() {
    let bins: Vec<u64> = (5..=9).chain(15..=18).collect();
    let config = PipelineConfig {
        max_gap_seconds: 2.0,
        min_detections: 2,
        skip_analysis: true,
        ..Default::default()
    };
    let pipeline = Pipeline::new(config, Arc::new(StaticClips));

    let report = pipeline
        .process(&video(20.0), &stream(20, &bins), &logger())
        .await
        .unwrap();

    let spans: Vec<(f64, f64)> = report
        .events
        .iter()
        .map(|e| (e.start_time, e.end_time))
        .collect();
    assert_eq!(spans, vec![(5.0, 9.0), (15.0, 18.0)]);
    assert!(report.events.iter().all(|e| e.clip_path.is_some()));
    assert_eq!(report.summary.total_events, 2);
}

#[tokio::test]
async fn seeded_sample_is_reproducible() {
    let (total, bins) = separated_runs(15);
    let config = PipelineConfig {
        sample_size: Some(10),
        seed: Some(42),
        skip_analysis: true,
        ..Default::default()
    };
    let pipeline = Pipeline::new(config, Arc::new(StaticClips));
    let detections = stream(total, &bins);

    let first = pipeline
        .process(&video(total as f64), &detections, &logger())
        .await
        .unwrap();
    let second = pipeline
        .process(&video(total as f64), &detections, &logger())
        .await
        .unwrap();

    let sampled = |events: &[Event]| -> Vec<u32> {
        events
            .iter()
            .filter(|e| e.disposition == Some(SamplingDisposition::Sampled))
            .map(|e| e.event_id)
            .collect()
    };

    assert_eq!(first.events.len(), 15);
    assert_eq!(sampled(&first.events).len(), 10);
    assert_eq!(sampled(&first.events), sampled(&second.events));
    assert_eq!(first.summary.sampled + first.summary.unsampled, 15);
    assert_eq!(first.sampling.seed, Some(42));
}

#[tokio::test]
async fn fast_overflow_vote_skips_vision() {
    let vision = CountingVision::new(0.02);
    let classifier = HybridClassifier::new(0.5)
        .with_fast(Arc::new(FullAtEnds {
            calls: AtomicUsize::new(0),
        }))
        .with_vlm(vision.clone());
    let pipeline =
        Pipeline::new(PipelineConfig::default(), Arc::new(StaticClips)).with_classifier(classifier);

    let report = pipeline
        .process(&video(20.0), &stream(20, &[4, 5, 6, 7, 8]), &logger())
        .await
        .unwrap();

    let classification = report.events[0].classification.as_ref().unwrap();
    assert_eq!(classification.event_type, EventType::Overflow);
    assert_eq!(classification.confidence, ConfidenceTier::High);
    assert_eq!(classification.method, ClassificationMethod::Yolo);
    assert_eq!(classification.votes.get("full"), Some(&2));
    assert_eq!(vision.calls(), 0);
    assert_eq!(report.cost.total_cost_usd, 0.0);
}

#[tokio::test]
async fn budget_ceiling_degrades_later_events() {
    let (total, bins) = separated_runs(5);
    let vision = CountingVision::new(0.02);
    let classifier = HybridClassifier::new(0.5)
        .with_fast(Arc::new(AlwaysLabel(OverflowLabel::NotFull)))
        .with_vlm(vision.clone());
    let config = PipelineConfig {
        max_vlm_cost_usd: 0.05,
        ..Default::default()
    };
    let pipeline = Pipeline::new(config, Arc::new(StaticClips)).with_classifier(classifier);

    let report = pipeline
        .process(&video(total as f64), &stream(total, &bins), &logger())
        .await
        .unwrap();

    assert_eq!(report.events.len(), 5);
    assert_eq!(vision.calls(), 2);

    let methods: Vec<ClassificationMethod> = report
        .events
        .iter()
        .map(|e| e.classification.as_ref().unwrap().method)
        .collect();
    assert_eq!(
        methods,
        vec![
            ClassificationMethod::Vlm,
            ClassificationMethod::Vlm,
            ClassificationMethod::None,
            ClassificationMethod::None,
            ClassificationMethod::None,
        ]
    );
    for event in &report.events[2..] {
        let c = event.classification.as_ref().unwrap();
        assert_eq!(c.event_type, EventType::NoEvent);
        assert_eq!(c.confidence, ConfidenceTier::Low);
        assert!(c.unanalyzed);
    }

    assert_eq!(report.cost.calls_granted, 2);
    assert_eq!(report.cost.calls_denied, 3);
    assert!(report.cost.exhausted);
    assert!(report.cost.total_cost_usd <= 0.05);
    assert_eq!(report.summary.unanalyzed, 3);
}

#[tokio::test]
async fn malformed_stream_aborts_before_report() {
    let mut detections = stream(10, &[2, 3, 4]);
    detections.swap(2, 6);
    let pipeline = Pipeline::new(PipelineConfig::default(), Arc::new(StaticClips));

    let err = pipeline
        .process(&video(10.0), &detections, &logger())
        .await
        .unwrap_err();
    assert!(err.is_structural());
}
