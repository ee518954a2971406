//! Event segmentation over the detection stream.
//!
//! Bin-positive frames are clustered into events with a gap-tolerance rule:
//! consecutive bin detections at most `max_gap_seconds` apart belong to the
//! same event, even across a few bin-negative frames in between.
//!
//! # State Machine
//!
//! ```text
//!              has_bin
//!     ┌──────────────────────────┐
//!     │                          ▼
//! ┌──────┐                  ┌────────┐  has_bin, gap <= max_gap
//! │ Idle │                  │  Open  │◄─────────────┐
//! └──────┘                  └────────┘──────────────┘
//!     ▲                          │
//!     │   gap > max_gap (emit)   │
//!     └──────────────────────────┘
//! ```
//!
//! Accumulators with fewer than `min_detections` bin frames are still
//! emitted, tagged `not_eligible`, so they remain visible in reports.

use binwatch_models::{DetectionRecord, Event, EventId, SamplingDisposition};
use tracing::debug;

use crate::error::{WorkerError, WorkerResult};

/// Absorbs float noise in `n / rate` timestamps when comparing against the gap.
const GAP_EPSILON: f64 = 1e-9;

/// Running state of an open event.
#[derive(Debug)]
struct Accumulator {
    start_time: f64,
    last_bin_time: f64,
    peak_timestamp: f64,
    peak_confidence: f32,
    frame_refs: Vec<u64>,
}

impl Accumulator {
    fn open(record: &DetectionRecord) -> Self {
        let mut acc = Self {
            start_time: record.timestamp_seconds,
            last_bin_time: record.timestamp_seconds,
            peak_timestamp: record.timestamp_seconds,
            peak_confidence: f32::NEG_INFINITY,
            frame_refs: Vec::new(),
        };
        acc.push(record);
        acc
    }

    fn push(&mut self, record: &DetectionRecord) {
        self.last_bin_time = record.timestamp_seconds;
        self.frame_refs.push(record.frame_index);

        // Strictly greater keeps the earliest frame on ties
        let confidence = record.peak_confidence().unwrap_or(0.0);
        if confidence > self.peak_confidence {
            self.peak_confidence = confidence;
            self.peak_timestamp = record.timestamp_seconds;
        }
    }
}

enum State {
    Idle,
    Open(Accumulator),
}

/// Single-pass event segmenter.
pub struct EventSegmenter {
    max_gap_seconds: f64,
    min_detections: usize,
    state: State,
    events: Vec<Event>,
}

impl EventSegmenter {
    pub fn new(max_gap_seconds: f64, min_detections: usize) -> Self {
        Self {
            max_gap_seconds,
            min_detections,
            state: State::Idle,
            events: Vec::new(),
        }
    }

    fn gap_exceeded(&self, since: f64, now: f64) -> bool {
        now - since > self.max_gap_seconds + GAP_EPSILON
    }

    /// Feed the next record. Records must arrive in stream order.
    pub fn ingest(&mut self, record: &DetectionRecord) {
        let state = std::mem::replace(&mut self.state, State::Idle);

        self.state = match (state, record.has_bin) {
            (State::Idle, false) => State::Idle,
            (State::Idle, true) => State::Open(Accumulator::open(record)),

            (State::Open(mut acc), true) => {
                if self.gap_exceeded(acc.last_bin_time, record.timestamp_seconds) {
                    self.close(acc);
                    State::Open(Accumulator::open(record))
                } else {
                    acc.push(record);
                    State::Open(acc)
                }
            }

            // A miss only ends the event once the absence outlasts the gap
            (State::Open(acc), false) => {
                if self.gap_exceeded(acc.last_bin_time, record.timestamp_seconds) {
                    self.close(acc);
                    State::Idle
                } else {
                    State::Open(acc)
                }
            }
        };
    }

    fn close(&mut self, acc: Accumulator) {
        let event_id = self.events.len() as EventId + 1;
        let detection_count = acc.frame_refs.len();
        let disposition = (detection_count < self.min_detections)
            .then_some(SamplingDisposition::NotEligible);

        debug!(
            event_id,
            start = acc.start_time,
            end = acc.last_bin_time,
            detection_count,
            eligible = disposition.is_none(),
            "Closed event"
        );

        self.events.push(Event {
            event_id,
            start_time: acc.start_time,
            end_time: acc.last_bin_time,
            peak_timestamp: acc.peak_timestamp,
            peak_confidence: acc.peak_confidence.max(0.0),
            detection_count,
            frame_refs: acc.frame_refs,
            clip_path: None,
            clip_error: None,
            disposition,
            classification: None,
        });
    }

    /// Close any open event and return all events in start-time order.
    pub fn finish(mut self) -> Vec<Event> {
        if let State::Open(acc) = std::mem::replace(&mut self.state, State::Idle) {
            self.close(acc);
        }
        self.events
    }
}

/// Cluster a detection stream into events.
///
/// An empty stream yields no events. A stream that breaks ordering or value
/// constraints is rejected before any clustering happens.
pub fn segment(
    detections: &[DetectionRecord],
    max_gap_seconds: f64,
    min_detections: usize,
) -> WorkerResult<Vec<Event>> {
    if !(max_gap_seconds.is_finite() && max_gap_seconds >= 0.0) {
        return Err(WorkerError::config_error(format!(
            "max gap must be non-negative, got {}",
            max_gap_seconds
        )));
    }

    DetectionRecord::validate_stream(detections)
        .map_err(|e| WorkerError::invalid_stream(e.to_string()))?;

    let mut segmenter = EventSegmenter::new(max_gap_seconds, min_detections);
    for record in detections {
        segmenter.ingest(record);
    }
    let events = segmenter.finish();

    Event::validate_sequence(&events)
        .map_err(|e| WorkerError::invariant_violation(e.to_string()))?;

    Ok(events)
}
