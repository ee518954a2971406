//! Random selection of events for paid analysis.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use binwatch_models::{Event, SamplingDisposition, SamplingInfo};

use crate::error::WorkerResult;

/// Tag every event with its sampling disposition.
///
/// Events already tagged `not_eligible` by the segmenter are left alone. When
/// `sample_size` is `None` or covers the whole eligible population, every
/// eligible event is sampled and no randomness is drawn. Otherwise exactly
/// `sample_size` events are drawn uniformly without replacement; a fixed `seed`
/// makes the draw reproducible.
pub fn sample(
    events: &mut [Event],
    sample_size: Option<usize>,
    seed: Option<u64>,
) -> WorkerResult<SamplingInfo> {
    let eligible: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.disposition.is_none())
        .map(|(i, _)| i)
        .collect();

    let (drawn, sampling_method) = match sample_size {
        Some(k) if k < eligible.len() => {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            let mut picks: Vec<usize> = rand::seq::index::sample(&mut rng, eligible.len(), k)
                .into_iter()
                .map(|i| eligible[i])
                .collect();
            picks.sort_unstable();
            (picks, "random")
        }
        _ => (eligible.clone(), "all"),
    };

    for &i in &eligible {
        let disposition = if drawn.binary_search(&i).is_ok() {
            SamplingDisposition::Sampled
        } else {
            SamplingDisposition::Unsampled
        };
        events[i].assign_disposition(disposition)?;
    }

    info!(
        eligible = eligible.len(),
        sampled = drawn.len(),
        total = events.len(),
        method = sampling_method,
        "Sampled events for analysis"
    );

    Ok(SamplingInfo {
        sample_size,
        seed,
        eligible_events: eligible.len(),
        sampled_events: drawn.len(),
        sampling_method: sampling_method.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(count: u32, not_eligible: &[u32]) -> Vec<Event> {
        (1..=count)
            .map(|id| {
                let start = id as f64 * 10.0;
                Event {
                    event_id: id,
                    start_time: start,
                    end_time: start + 3.0,
                    peak_timestamp: start + 1.0,
                    peak_confidence: 0.9,
                    detection_count: 4,
                    frame_refs: vec![1, 2, 3, 4],
                    clip_path: None,
                    clip_error: None,
                    disposition: not_eligible
                        .contains(&id)
                        .then_some(SamplingDisposition::NotEligible),
                    classification: None,
                }
            })
            .collect()
    }

    fn sampled_ids(events: &[Event]) -> Vec<u32> {
        events
            .iter()
            .filter(|e| e.is_sampled())
            .map(|e| e.event_id)
            .collect()
    }

    #[test]
    fn test_seeded_draw_is_reproducible() {
        let mut first = events(15, &[]);
        let mut second = events(15, &[]);

        let info = sample(&mut first, Some(10), Some(42)).unwrap();
        sample(&mut second, Some(10), Some(42)).unwrap();

        assert_eq!(info.sampled_events, 10);
        assert_eq!(info.eligible_events, 15);
        assert_eq!(info.sampling_method, "random");
        assert_eq!(sampled_ids(&first).len(), 10);
        assert_eq!(sampled_ids(&first), sampled_ids(&second));
    }

    #[test]
    fn test_counts_add_up() {
        let mut evs = events(12, &[3, 7]);
        sample(&mut evs, Some(4), Some(7)).unwrap();

        let count = |d: SamplingDisposition| evs.iter().filter(|e| e.disposition == Some(d)).count();
        assert_eq!(count(SamplingDisposition::Sampled), 4);
        assert_eq!(count(SamplingDisposition::Unsampled), 6);
        assert_eq!(count(SamplingDisposition::NotEligible), 2);
        assert!(evs.iter().all(|e| e.disposition.is_some()));
    }

    #[test]
    fn test_not_eligible_never_drawn() {
        let mut evs = events(6, &[1, 2, 3]);
        sample(&mut evs, Some(2), Some(1)).unwrap();
        assert!(sampled_ids(&evs).iter().all(|id| *id > 3));
    }

    #[test]
    fn test_large_sample_takes_everything() {
        let mut evs = events(5, &[2]);
        let info = sample(&mut evs, Some(10), None).unwrap();
        assert_eq!(info.sampling_method, "all");
        assert_eq!(sampled_ids(&evs), vec![1, 3, 4, 5]);
    }

    #[test]
    fn test_no_sample_size_takes_everything() {
        let mut evs = events(3, &[]);
        let info = sample(&mut evs, None, None).unwrap();
        assert_eq!(info.sampled_events, 3);
        assert_eq!(info.sample_size, None);
    }

    #[test]
    fn test_zero_sample_size() {
        let mut evs = events(3, &[]);
        sample(&mut evs, Some(0), Some(5)).unwrap();
        assert!(evs
            .iter()
            .all(|e| e.disposition == Some(SamplingDisposition::Unsampled)));
    }

    #[test]
    fn test_second_pass_is_noop() {
        let mut evs = events(3, &[]);
        sample(&mut evs, None, None).unwrap();
        // Nothing is left eligible, so a second pass changes nothing
        let info = sample(&mut evs, Some(1), Some(1)).unwrap();
        assert_eq!(info.eligible_events, 0);
        assert_eq!(sampled_ids(&evs), vec![1, 2, 3]);
    }
}
