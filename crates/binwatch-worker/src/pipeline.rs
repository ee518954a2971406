//! Run orchestration.
//!
//! acquire → probe → frames → detection → segment → clips → sample →
//! classify → report. Stages run one after another and hand the event list
//! along; only structural errors abort a run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{warn, Instrument};
use uuid::Uuid;

use binwatch_media::{
    acquire_video, extract_frames, probe_video, ClipSource, FfmpegClipExtractor, VideoHandle,
    VideoSource,
};
use binwatch_ml_client::InferenceClient;
use binwatch_models::{DetectionRecord, Event, RunReport, RunSummary, VideoSummary};

use crate::classifier::HybridClassifier;
use crate::config::PipelineConfig;
use crate::cost_guard::CostGuard;
use crate::detector::{attach_frame_paths, detect_frames, load_detection_stream, BinDetector};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::RunLogger;
use crate::report::{write_reports, ReportPaths};
use crate::sampler::sample;
use crate::segmenter::segment;

/// Where a run's detection stream comes from.
#[derive(Debug, Clone)]
pub enum DetectionInput {
    /// Run the configured detector over freshly extracted frames
    Detect,
    /// Load a pre-computed stream from a JSON file
    File(PathBuf),
}

/// A probed source video ready for segmentation.
#[derive(Debug, Clone)]
pub struct PreparedVideo {
    pub summary: VideoSummary,
    pub path: PathBuf,
}

/// Finished run.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub paths: ReportPaths,
}

/// The end-to-end event pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    classifier: HybridClassifier,
    clips: Arc<dyn ClipSource>,
    detector: Option<Arc<dyn BinDetector>>,
}

impl Pipeline {
    /// Pipeline with no classifiers or detector attached.
    pub fn new(config: PipelineConfig, clips: Arc<dyn ClipSource>) -> Self {
        let classifier = HybridClassifier::new(config.overflow_threshold);
        Self {
            config,
            classifier,
            clips,
            detector: None,
        }
    }

    pub fn with_classifier(mut self, classifier: HybridClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn BinDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Wire up the production collaborators from configuration.
    pub fn from_config(config: PipelineConfig) -> WorkerResult<Self> {
        config.validate()?;

        let inference = Arc::new(InferenceClient::new(config.inference.clone())?);

        let mut classifier = HybridClassifier::new(config.overflow_threshold);
        if config.use_fast_classifier {
            classifier = classifier.with_fast(inference.clone());
        }
        if config.vlm.is_configured() {
            let vlm = crate::vlm::OpenAiVisionClient::new(config.vlm.clone())?;
            classifier = classifier.with_vlm(Arc::new(vlm));
        } else {
            warn!("OPENAI_API_KEY not set, vision-language analysis disabled");
        }

        let clips = Arc::new(
            FfmpegClipExtractor::new(config.clips_dir()).with_encoding(config.clip_encoding.clone()),
        );

        Ok(Self::new(config, clips)
            .with_classifier(classifier)
            .with_detector(inference))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one video from a URL or local path and write its reports.
    pub async fn run(&self, input: &str, detections: DetectionInput) -> WorkerResult<RunOutcome> {
        self.config.validate()?;

        let run_id = Uuid::new_v4().to_string();
        let logger = RunLogger::new(&run_id, "pending");
        let span = logger.create_span();

        async move {
            let acquire_log = logger.stage("acquire");
            acquire_log.log_start(input);
            let source = VideoSource::parse(input);
            let acquired =
                acquire_video(&source, self.config.videos_dir(), self.config.cookies.as_deref())
                    .await
                    .inspect_err(|e| acquire_log.log_error(&e.to_string()))?;
            let logger = logger.with_video_id(acquired.video_id.as_str());
            logger
                .stage("acquire")
                .log_completion(&format!("video at {}", acquired.path.display()));

            let probe_log = logger.stage("probe");
            let info = probe_video(&acquired.path)
                .await
                .inspect_err(|e| probe_log.log_error(&e.to_string()))?;
            probe_log.log_progress(&format!(
                "{:.1}s, {}x{} @ {:.2} fps",
                info.duration, info.width, info.height, info.fps
            ));

            let frames_log = logger.stage("frames");
            frames_log.log_start(&format!("sampling at {} Hz", self.config.sample_rate_hz));
            let frames = extract_frames(
                &acquired.path,
                self.config.frames_dir(),
                &acquired.video_id,
                self.config.sample_rate_hz,
                info.duration,
            )
            .await
            .inspect_err(|e| frames_log.log_error(&e.to_string()))?;
            let expected = info.expected_samples(self.config.sample_rate_hz);
            if (frames.len() as u64).abs_diff(expected) > 1 {
                frames_log.log_warning(&format!(
                    "expected about {} frames, got {}",
                    expected,
                    frames.len()
                ));
            }
            frames_log.log_completion(&format!("{} frames", frames.len()));

            let detect_log = logger.stage("detect");
            let records = match &detections {
                DetectionInput::File(path) => {
                    let mut records = load_detection_stream(path).await?;
                    attach_frame_paths(&mut records, &frames);
                    records
                }
                DetectionInput::Detect => {
                    let detector = self.detector.as_ref().ok_or_else(|| {
                        WorkerError::config_error("no bin detector configured")
                    })?;
                    detect_frames(detector.as_ref(), &frames, self.config.detection_confidence)
                        .await?
                }
            };
            detect_log.log_completion(&format!("{} detection records", records.len()));

            let video = PreparedVideo {
                summary: info.summary(
                    acquired.video_id.clone(),
                    source.display(),
                    self.config.sample_rate_hz,
                ),
                path: acquired.path.clone(),
            };

            let report = self.process(&video, &records, &logger).await?;

            let report_log = logger.stage("report");
            let paths = write_reports(&report, &self.config.reports_dir()).await?;
            report_log.log_completion(&paths.markdown.display().to_string());

            Ok::<_, WorkerError>(RunOutcome { report, paths })
        }
        .instrument(span)
        .await
    }

    /// Segment, clip, sample and classify a detection stream.
    ///
    /// Returns the report data without writing it. Structural problems in
    /// the stream fail here, before any report exists.
    pub async fn process(
        &self,
        video: &PreparedVideo,
        detections: &[DetectionRecord],
        logger: &RunLogger,
    ) -> WorkerResult<RunReport> {
        if detections.is_empty() {
            return Err(WorkerError::invalid_stream(
                "acquisition produced no frames for this video",
            ));
        }

        let segment_log = logger.stage("segment");
        let mut events = segment(
            detections,
            self.config.max_gap_seconds,
            self.config.min_detections,
        )?;
        segment_log.log_completion(&format!("{} events", events.len()));

        self.extract_clips(&mut events, video, logger).await;

        let sampling = sample(&mut events, self.config.sample_size, self.config.seed)?;

        let mut guard = CostGuard::new(self.config.max_vlm_cost_usd);
        if self.config.skip_analysis {
            logger
                .stage("classify")
                .log_progress("analysis skipped by configuration");
        } else {
            self.classify_events(&mut events, detections, video, &mut guard, logger)
                .await?;
        }

        Event::validate_sequence(&events)
            .map_err(|e| WorkerError::invariant_violation(e.to_string()))?;

        Ok(RunReport {
            run_id: logger.run_id().to_string(),
            generated_at: Utc::now(),
            video: video.summary.clone(),
            summary: RunSummary::from_events(&events),
            sampling,
            cost: guard.summary(),
            events,
        })
    }

    /// Clip every eligible event. Failures leave the event clip-less.
    async fn extract_clips(&self, events: &mut [Event], video: &PreparedVideo, logger: &RunLogger) {
        let clip_log = logger.stage("clips");
        let handle = VideoHandle {
            video_id: video.summary.video_id.clone(),
            path: video.path.clone(),
            duration: video.summary.duration,
        };

        let mut failed = 0;
        for event in events.iter_mut().filter(|e| e.is_eligible()) {
            match self
                .clips
                .extract(
                    event,
                    &handle,
                    self.config.clip_duration_seconds,
                    self.config.clip_pad_before_seconds,
                )
                .await
            {
                Ok(path) => event.clip_path = Some(path),
                Err(e) => {
                    failed += 1;
                    clip_log.log_warning(&format!("event {} has no clip: {}", event.event_id, e));
                    event.clip_error = Some(e.to_string());
                }
            }
        }
        clip_log.log_completion(&format!("{} clip failures", failed));
    }

    async fn classify_events(
        &self,
        events: &mut [Event],
        detections: &[DetectionRecord],
        video: &PreparedVideo,
        guard: &mut CostGuard,
        logger: &RunLogger,
    ) -> WorkerResult<()> {
        let classify_log = logger.stage("classify");
        let frame_paths: HashMap<u64, &Path> = detections
            .iter()
            .filter_map(|r| r.frame_path.as_deref().map(|p| (r.frame_index, p)))
            .collect();

        let total = events.iter().filter(|e| e.is_sampled()).count();
        classify_log.log_start(&format!(
            "{} sampled events (fast classifier: {}, vision-language: {})",
            total,
            self.classifier.has_fast(),
            self.classifier.has_vlm()
        ));

        for event in events.iter_mut().filter(|e| e.is_sampled()) {
            let frames: Vec<PathBuf> = event
                .frame_refs
                .iter()
                .filter_map(|i| frame_paths.get(i).map(|p| p.to_path_buf()))
                .collect();
            let context = format!(
                "Bin visible from {:.1}s to {:.1}s (clearest at {:.1}s) in a {:.1} second video",
                event.start_time, event.end_time, event.peak_timestamp, video.summary.duration
            );

            let classification = self
                .classifier
                .classify(event, &frames, guard, &context)
                .await;
            classification.validate()?;
            event.classification = Some(classification);
        }

        let cost = guard.summary();
        classify_log.log_completion(&format!(
            "spent ${:.2} of ${:.2}, {} calls denied",
            cost.total_cost_usd, cost.max_cost_usd, cost.calls_denied
        ));
        Ok(())
    }
}
