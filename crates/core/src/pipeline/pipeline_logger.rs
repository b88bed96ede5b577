use std::collections::BTreeMap;
use std::time::Instant;

/// Observer for capture loop events: per-stage timings, gauges such as the
/// recorder's queue depth, and progress.
///
/// Keeps the use cases free of any particular reporting mechanism.
pub trait PipelineLogger: Send {
    /// Reports that `processed` frames went through the loop. `total` is
    /// known for files and unknown for live sources.
    fn progress(&mut self, processed: usize, total: Option<usize>);

    /// Records how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Records a point-in-time value (e.g. queued frames, detections).
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// Emits an end-of-run report. Default: no-op.
    fn summary(&self) {}
}

/// Discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _processed: usize, _total: Option<usize>) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

#[derive(Default)]
struct Series {
    count: usize,
    sum: f64,
    max: f64,
}

impl Series {
    fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.max = if self.count == 1 {
            value
        } else {
            self.max.max(value)
        };
    }

    fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Logger backed by the `log` facade with throttled progress lines and an
/// end-of-run summary of stage timings, gauges and throughput.
///
/// Keeps running sums only, so memory stays flat on an endless camera feed.
pub struct SummaryPipelineLogger {
    throttle_frames: usize,
    timings: BTreeMap<String, Series>,
    metrics: BTreeMap<String, Series>,
    start_time: Instant,
    processed: usize,
}

impl SummaryPipelineLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: BTreeMap::new(),
            metrics: BTreeMap::new(),
            start_time: Instant::now(),
            processed: 0,
        }
    }

    /// Returns the formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let frames = self.processed;
        let mut lines = vec![format!(
            "Capture summary ({frames} frames, {:.1}s total):",
            elapsed_ms / 1000.0
        )];

        for (stage, series) in &self.timings {
            lines.push(format!(
                "  {stage:10}: avg {:6.1}ms  max {:6.1}ms  total {:7.0}ms",
                series.avg(),
                series.max,
                series.sum
            ));
        }
        for (name, series) in &self.metrics {
            lines.push(format!("  {name}: avg {:.1}  max {:.0}", series.avg(), series.max));
        }

        if frames > 0 && elapsed_ms > 0.0 {
            let fps = frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    pub fn average_timing(&self, stage: &str) -> Option<f64> {
        self.timings.get(stage).map(Series::avg)
    }

    pub fn average_metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).map(Series::avg)
    }

    pub fn processed(&self) -> usize {
        self.processed
    }
}

impl Default for SummaryPipelineLogger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl PipelineLogger for SummaryPipelineLogger {
    fn progress(&mut self, processed: usize, total: Option<usize>) {
        self.processed = processed;
        let due = processed % self.throttle_frames == 0;
        match total {
            Some(total) if total > 0 && (due || processed == total) => {
                let pct = processed as f64 / total as f64 * 100.0;
                log::info!("Processing: {processed}/{total} frames ({pct:.1}%)");
            }
            None if due => log::info!("Processing: {processed} frames"),
            _ => {}
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().push(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
