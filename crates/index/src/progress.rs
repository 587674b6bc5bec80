//! Progress reporting.
//!
//! A build is a fixed sequence of jobs. The reporter announces the number of
//! jobs first, then each job with `progress: 0`, then fractional progress
//! within the job. Fractions only ever increase within a job; a value that
//! would not move progress forward is dropped.

use derive_more::Display;
use serde::Serialize;

/// One progress event. Every field is optional; consumers merge events into
/// their current view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_step_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_step: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recs_loaded: Option<u64>,
    /// Catalog files read so far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_files: Option<u64>,
}

/// Named build jobs, in the order they can run.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    #[display("load catalog")]
    Load,
    #[display("remove duplicates")]
    Dedup,
    #[display("create indexes")]
    Index,
    #[display("finalize")]
    Finalize,
    #[display("other indexes")]
    Secondary,
    #[display("optimization")]
    Optimize,
    #[display("stats count")]
    Stats,
}

impl Job {
    pub fn message(self) -> &'static str {
        match self {
            Self::Load => "Loading catalog",
            Self::Dedup => "Removing duplicates",
            Self::Index => "Building author, series and title indexes",
            Self::Finalize => "Finalizing book table",
            Self::Secondary => "Building remaining indexes",
            Self::Optimize => "Optimizing",
            Self::Stats => "Counting statistics",
        }
    }
}

/// Drives a progress callback and enforces monotonic progress.
pub struct Reporter<'a> {
    callback: Box<dyn FnMut(&Progress) + Send + 'a>,
    step: u32,
    last: f64,
}

impl<'a> Reporter<'a> {
    pub fn new(callback: impl FnMut(&Progress) + Send + 'a) -> Self {
        Self {
            callback: Box::new(callback),
            step: 0,
            last: 0.0,
        }
    }

    /// Reporter that discards every event.
    pub fn silent() -> Self {
        Self::new(|_| {})
    }

    fn emit(&mut self, progress: Progress) {
        (self.callback)(&progress);
    }

    pub fn job_count(&mut self, count: u32) {
        self.emit(Progress {
            job_step_count: Some(count),
            ..Default::default()
        });
    }

    /// Begin the next job; progress restarts at zero.
    pub fn start(&mut self, job: Job) {
        self.step += 1;
        self.last = 0.0;
        tracing::info!(step = self.step, %job, "job started");
        self.emit(Progress {
            job: Some(job.to_string()),
            job_message: Some(job.message().to_string()),
            job_step: Some(self.step),
            progress: Some(0.0),
            ..Default::default()
        });
    }

    /// Report progress within the current job.
    pub fn advance(&mut self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction > self.last {
            self.last = fraction;
            self.emit(Progress {
                progress: Some(fraction),
                ..Default::default()
            });
        }
    }

    pub fn recs_loaded(&mut self, count: u64) {
        self.emit(Progress {
            recs_loaded: Some(count),
            ..Default::default()
        });
    }

    /// Forward the catalog parser's read position.
    pub fn read_state(&mut self, current: u64, total_files: u64) {
        self.emit(Progress {
            current: Some(current),
            total_files: Some(total_files),
            ..Default::default()
        });
        if total_files > 0 {
            self.advance(current as f64 / total_files as f64);
        }
    }

    pub fn finish(&mut self) {
        self.emit(Progress {
            job: Some("done".to_string()),
            job_message: Some(String::new()),
            ..Default::default()
        });
    }

    /// Map `[0, 1]` onto `[start, start + width]` of the current job.
    pub fn phase(&mut self, start: f64, width: f64) -> Phase<'_, 'a> {
        Phase {
            reporter: self,
            start,
            width,
        }
    }
}

/// A slice of the current job's progress range, handed to one component.
pub struct Phase<'r, 'a> {
    reporter: &'r mut Reporter<'a>,
    start: f64,
    width: f64,
}

impl<'a> Phase<'_, 'a> {
    pub fn set(&mut self, fraction: f64) {
        self.reporter.advance(self.start + self.width * fraction.clamp(0.0, 1.0));
    }

    /// Narrow this phase further: `[start, start + width]` of this phase.
    pub fn sub(&mut self, start: f64, width: f64) -> Phase<'_, 'a> {
        Phase {
            start: self.start + self.width * start,
            width: self.width * width,
            reporter: &mut *self.reporter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording() -> (Reporter<'static>, Arc<Mutex<Vec<Progress>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let reporter = Reporter::new(move |p: &Progress| sink.lock().unwrap().push(p.clone()));
        (reporter, events)
    }

    #[test]
    fn test_progress_never_goes_backwards() {
        let (mut reporter, events) = recording();
        reporter.start(Job::Load);
        reporter.advance(0.5);
        reporter.advance(0.4);
        reporter.advance(0.5);
        reporter.advance(2.0);
        let values: Vec<f64> = events.lock().unwrap().iter().filter_map(|p| p.progress).collect();
        assert_eq!(values, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_phase_scales() {
        let (mut reporter, events) = recording();
        reporter.start(Job::Index);
        reporter.phase(0.5, 0.25).set(1.0);
        let last = events.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.progress, Some(0.75));
    }

    #[test]
    fn test_job_steps_count_up() {
        let (mut reporter, events) = recording();
        reporter.job_count(2);
        reporter.start(Job::Load);
        reporter.start(Job::Stats);
        let steps: Vec<u32> = events.lock().unwrap().iter().filter_map(|p| p.job_step).collect();
        assert_eq!(steps, vec![1, 2]);
        assert_eq!(events.lock().unwrap()[0].job_step_count, Some(2));
    }

    #[test]
    fn test_serialized_shape() {
        let progress = Progress {
            job: Some("load catalog".to_string()),
            progress: Some(0.0),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&progress).unwrap(), r#"{"job":"load catalog","progress":0.0}"#);
    }
}
