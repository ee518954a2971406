//! JSON and Markdown run reports.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::info;

use binwatch_models::timestamp::format_hms;
use binwatch_models::{Event, RunReport};

use crate::error::{WorkerError, WorkerResult};

/// Paths of the written report pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

/// Base file name shared by both report files.
pub fn report_stem(report: &RunReport) -> String {
    format!(
        "report_{}_{}",
        report.video.video_id,
        report.generated_at.format("%Y%m%d_%H%M%S")
    )
}

/// Write `report` as JSON and Markdown under `reports_dir`.
pub async fn write_reports(report: &RunReport, reports_dir: &Path) -> WorkerResult<ReportPaths> {
    tokio::fs::create_dir_all(reports_dir).await?;

    let stem = report_stem(report);
    let json = reports_dir.join(format!("{}.json", stem));
    let markdown = reports_dir.join(format!("{}.md", stem));

    let body = serde_json::to_string_pretty(report)?;
    tokio::fs::write(&json, body).await?;

    let text = render_markdown(report)
        .map_err(|e| WorkerError::report_failed(format!("markdown rendering: {}", e)))?;
    tokio::fs::write(&markdown, text).await?;

    info!(
        json = %json.display(),
        markdown = %markdown.display(),
        "Reports written"
    );
    Ok(ReportPaths { json, markdown })
}

fn event_row(out: &mut String, event: &Event) -> std::fmt::Result {
    let disposition = event
        .disposition
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());
    let (event_type, confidence, method) = match &event.classification {
        Some(c) => (
            c.event_type.label().to_string(),
            c.confidence.to_string(),
            c.method.to_string(),
        ),
        None => ("-".to_string(), "-".to_string(), "-".to_string()),
    };
    let clip = match (&event.clip_path, &event.clip_error) {
        (Some(path), _) => path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        (None, Some(_)) => "failed".to_string(),
        (None, None) => "-".to_string(),
    };

    writeln!(
        out,
        "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {} |",
        event.event_id,
        format_hms(event.start_time),
        format_hms(event.end_time),
        format_hms(event.peak_timestamp),
        event.detection_count,
        disposition,
        event_type,
        confidence,
        method,
        clip
    )
}

/// Render the human-readable summary.
pub fn render_markdown(report: &RunReport) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    let video = &report.video;
    let summary = &report.summary;
    let sampling = &report.sampling;
    let cost = &report.cost;

    writeln!(out, "# Bin Event Report: {}", video.video_id)?;
    writeln!(out)?;
    writeln!(out, "- **Run ID**: {}", report.run_id)?;
    writeln!(
        out,
        "- **Generated**: {}",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    writeln!(out, "- **Source**: {}", video.source)?;
    writeln!(
        out,
        "- **Duration**: {} ({:.1}s, {}x{} @ {:.2} fps)",
        format_hms(video.duration),
        video.duration,
        video.width,
        video.height,
        video.fps
    )?;
    writeln!(out, "- **Sample rate**: {} Hz", video.sample_rate_hz)?;
    writeln!(out)?;

    writeln!(out, "## Summary")?;
    writeln!(out)?;
    writeln!(out, "| Metric | Count |")?;
    writeln!(out, "|--------|-------|")?;
    writeln!(out, "| Total events | {} |", summary.total_events)?;
    writeln!(out, "| Sampled | {} |", summary.sampled)?;
    writeln!(out, "| Unsampled | {} |", summary.unsampled)?;
    writeln!(out, "| Not eligible | {} |", summary.not_eligible)?;
    writeln!(out, "| Classified | {} |", summary.classified)?;
    writeln!(out, "| Unanalyzed | {} |", summary.unanalyzed)?;
    writeln!(out, "| Without clip | {} |", summary.clipless)?;
    writeln!(out)?;

    writeln!(out, "## Sampling")?;
    writeln!(out)?;
    writeln!(out, "- **Method**: {}", sampling.sampling_method)?;
    match sampling.sample_size {
        Some(size) => writeln!(out, "- **Requested sample size**: {}", size)?,
        None => writeln!(out, "- **Requested sample size**: all")?,
    }
    match sampling.seed {
        Some(seed) => writeln!(out, "- **Seed**: {}", seed)?,
        None => writeln!(out, "- **Seed**: random")?,
    }
    writeln!(
        out,
        "- **Sampled**: {} of {} eligible events",
        sampling.sampled_events, sampling.eligible_events
    )?;
    writeln!(out)?;

    writeln!(out, "## Cost")?;
    writeln!(out)?;
    writeln!(
        out,
        "- **Spent**: ${:.2} of ${:.2} (remaining ${:.2})",
        cost.total_cost_usd, cost.max_cost_usd, cost.remaining_usd
    )?;
    if let Some(pct) = cost.utilization_percent() {
        writeln!(out, "- **Utilization**: {:.1}%", pct)?;
    }
    writeln!(
        out,
        "- **Paid calls**: {} granted, {} denied",
        cost.calls_granted, cost.calls_denied
    )?;
    writeln!(out, "- **Images analyzed**: {}", cost.images_analyzed)?;
    if cost.exhausted {
        writeln!(out, "- **Budget exhausted**: later events were not analyzed")?;
    }
    writeln!(out)?;

    if !summary.by_event_type.is_empty() {
        writeln!(out, "## Event Types")?;
        writeln!(out)?;
        writeln!(out, "| Event type | Count |")?;
        writeln!(out, "|------------|-------|")?;
        for (event_type, count) in &summary.by_event_type {
            writeln!(out, "| {} | {} |", event_type, count)?;
        }
        writeln!(out)?;
    }

    writeln!(out, "## Events")?;
    writeln!(out)?;
    if report.events.is_empty() {
        writeln!(out, "No bin events detected.")?;
        return Ok(out);
    }
    writeln!(
        out,
        "| # | Start | End | Peak | Detections | Disposition | Event type | Confidence | Method | Clip |"
    )?;
    writeln!(
        out,
        "|---|-------|-----|------|------------|-------------|------------|------------|--------|------|"
    )?;
    for event in &report.events {
        event_row(&mut out, event)?;
    }

    let described: Vec<&Event> = report
        .events
        .iter()
        .filter(|e| {
            e.classification
                .as_ref()
                .and_then(|c| c.description.as_ref())
                .is_some_and(|d| !d.is_empty())
        })
        .collect();
    if !described.is_empty() {
        writeln!(out)?;
        writeln!(out, "## Descriptions")?;
        for event in described {
            if let Some(description) = event
                .classification
                .as_ref()
                .and_then(|c| c.description.as_deref())
            {
                writeln!(out)?;
                writeln!(
                    out,
                    "**Event {}** ({}): {}",
                    event.event_id,
                    format_hms(event.peak_timestamp),
                    description
                )?;
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use binwatch_models::{
        ConfidenceTier, CostSummary, EventClassification, EventType, RunSummary,
        SamplingDisposition, SamplingInfo, VideoId, VideoSummary,
    };
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn report() -> RunReport {
        let mut classified = Event {
            event_id: 1,
            start_time: 65.0,
            end_time: 70.0,
            peak_timestamp: 67.0,
            peak_confidence: 0.92,
            detection_count: 6,
            frame_refs: vec![65, 66, 67, 68, 69, 70],
            clip_path: Some(PathBuf::from("clips/abc/event_001_t67.00s.mp4")),
            clip_error: None,
            disposition: Some(SamplingDisposition::Sampled),
            classification: None,
        };
        classified.classification = Some(EventClassification::from_vlm(
            EventType::BlockedAccess,
            ConfidenceTier::High,
            "A van is parked in front of the bin",
            BTreeMap::from([("blocked_access".to_string(), 3)]),
            0.03,
        ));
        let skipped = Event {
            event_id: 2,
            start_time: 120.0,
            end_time: 120.0,
            peak_timestamp: 120.0,
            peak_confidence: 0.55,
            detection_count: 1,
            frame_refs: vec![120],
            clip_path: None,
            clip_error: Some("corrupt".to_string()),
            disposition: Some(SamplingDisposition::NotEligible),
            classification: None,
        };
        let events = vec![classified, skipped];

        RunReport {
            run_id: "run-1".to_string(),
            generated_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
            video: VideoSummary {
                video_id: VideoId::from_string("abc"),
                source: "https://www.youtube.com/watch?v=abc".to_string(),
                duration: 300.0,
                fps: 30.0,
                width: 1280,
                height: 720,
                sample_rate_hz: 1.0,
            },
            summary: RunSummary::from_events(&events),
            sampling: SamplingInfo {
                sample_size: None,
                seed: None,
                eligible_events: 1,
                sampled_events: 1,
                sampling_method: "all".to_string(),
            },
            cost: CostSummary {
                total_cost_usd: 0.03,
                max_cost_usd: 1.0,
                remaining_usd: 0.97,
                calls_granted: 1,
                calls_denied: 0,
                images_analyzed: 3,
                exhausted: false,
            },
            events,
        }
    }

    #[test]
    fn test_report_stem() {
        assert_eq!(report_stem(&report()), "report_abc_20260314_092653");
    }

    #[test]
    fn test_markdown_content() {
        let md = render_markdown(&report()).unwrap();
        assert!(md.contains("# Bin Event Report: abc"));
        assert!(md.contains("| 1 | 00:01:05 | 00:01:10 | 00:01:07 | 6 | sampled | Blocked access | high | vlm | event_001_t67.00s.mp4 |"));
        assert!(md.contains("| 2 | 00:02:00 | 00:02:00 | 00:02:00 | 1 | not_eligible | - | - | - | failed |"));
        assert!(md.contains("- **Utilization**: 3.0%"));
        assert!(md.contains("| blocked_access | 1 |"));
        assert!(md.contains("A van is parked"));
    }

    #[test]
    fn test_markdown_without_events() {
        let mut empty = report();
        empty.events.clear();
        empty.summary = RunSummary::default();
        let md = render_markdown(&empty).unwrap();
        assert!(md.contains("No bin events detected."));
    }

    #[tokio::test]
    async fn test_write_reports() {
        let dir = tempfile::tempdir().unwrap();
        let reports_dir = dir.path().join("reports");
        let original = report();

        let paths = write_reports(&original, &reports_dir).await.unwrap();
        assert!(paths.json.ends_with("report_abc_20260314_092653.json"));
        assert!(paths.markdown.exists());

        let parsed: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert_eq!(parsed, original);
    }
}
