use std::time::Duration;

use crate::types::{BatchReport, ConcatOutcome, SlideStatus, TrackReport};

/// Seconds with two decimals, as passed to the encoder.
pub fn format_seconds(seconds: f64) -> String {
    format!("{:.2}", seconds)
}

/// Format an elapsed time as `4.2s` or `3m 12s`
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if (secs * 10.0).round() < 600.0 {
        format!("{:.1}s", secs)
    } else {
        let total = secs.round() as u64;
        format!("{}m {}s", total / 60, total % 60)
    }
}

/// One line per slide, skipped slides with their reason
pub fn format_batch_report(label: &str, report: &BatchReport) -> String {
    let mut output = format!(
        "{}: {} created, {} skipped\n",
        label,
        report.created(),
        report.skipped()
    );
    for outcome in &report.outcomes {
        match &outcome.status {
            SlideStatus::Created(path) => output.push_str(&format!(
                "  ✓ {:03} {}\n",
                outcome.slide_number,
                path.display()
            )),
            SlideStatus::Skipped(reason) => output.push_str(&format!(
                "  ✗ {:03} {}\n",
                outcome.slide_number, reason
            )),
        }
    }
    output
}

pub fn format_track_report(report: &TrackReport) -> String {
    let mut output = format!("[{}]\n", report.language);
    output.push_str(&format_batch_report("Audio", &report.audio));
    output.push_str(&format_batch_report("Clips", &report.clips));
    match &report.combined {
        ConcatOutcome::Created(path) => {
            output.push_str(&format!("Video: {}\n", path.display()));
        }
        ConcatOutcome::Skipped => output.push_str("Video: skipped (no clips)\n"),
    }
    output
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::types::SlideOutcome;

    #[test]
    fn formats_seconds_for_encoder() {
        assert_eq!(format_seconds(3.0), "3.00");
        assert_eq!(format_seconds(12.346), "12.35");
    }

    #[test]
    fn formats_elapsed_time() {
        assert_eq!(format_duration(Duration::from_millis(4200)), "4.2s");
        assert_eq!(format_duration(Duration::from_secs(192)), "3m 12s");
    }

    #[test]
    fn elapsed_time_carries_into_minutes() {
        assert_eq!(format_duration(Duration::from_millis(119_600)), "2m 0s");
        assert_eq!(format_duration(Duration::from_millis(59_960)), "1m 0s");
        assert_eq!(format_duration(Duration::from_millis(59_940)), "59.9s");
        assert_eq!(format_duration(Duration::from_millis(60_400)), "1m 0s");
    }

    #[test]
    fn batch_report_lists_skips_with_reason() {
        let report = BatchReport {
            outcomes: vec![
                SlideOutcome::created(1, PathBuf::from("a/slide.001.wav")),
                SlideOutcome::skipped(2, "quota exceeded"),
            ],
        };
        let text = format_batch_report("Audio", &report);
        assert!(text.starts_with("Audio: 1 created, 1 skipped\n"));
        assert!(text.contains("✓ 001 a/slide.001.wav"));
        assert!(text.contains("✗ 002 quota exceeded"));
    }
}
