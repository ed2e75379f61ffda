//! Terminal rendering of download progress
//!
//! Consumes [`ProgressEvent`]s until every sender is dropped. Output goes to
//! stderr so that stdout stays machine-readable.

use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use mpm_core::install::ProgressEvent;

/// Report every quarter of a known download size
const STEPS: u64 = 4;

/// Without a size, report bytes received each time another MiB arrives
const UNSIZED_STEP: u64 = 1024 * 1024;

#[derive(Debug, Default)]
struct JobState {
    filename: String,
    total: Option<u64>,
    written: u64,
    step: u64,
}

/// Formats events into lines; `None` for events that print nothing
#[derive(Debug, Default)]
pub struct Renderer {
    jobs: HashMap<String, JobState>,
}

impl Renderer {
    pub fn render(&mut self, event: ProgressEvent) -> Option<String> {
        match event {
            ProgressEvent::Started { job, filename } => {
                let line = format!("  -> {job}: {filename}");
                self.jobs.insert(
                    job,
                    JobState {
                        filename,
                        ..Default::default()
                    },
                );
                Some(line)
            }
            ProgressEvent::Total { job, bytes } => {
                self.jobs.entry(job).or_default().total = bytes;
                None
            }
            ProgressEvent::Advanced { job, written } => {
                let state = self.jobs.entry(job.clone()).or_default();
                state.written = state.written.max(written);
                match state.total.filter(|t| *t > 0) {
                    Some(total) => {
                        let step = (state.written.min(total) * STEPS) / total;
                        if step > state.step && step < STEPS {
                            state.step = step;
                            Some(format!("     {job}: {}%", step * 100 / STEPS))
                        } else {
                            None
                        }
                    }
                    None => {
                        let step = state.written / UNSIZED_STEP;
                        if step > state.step {
                            state.step = step;
                            Some(format!("     {job}: {}", format_bytes(state.written)))
                        } else {
                            None
                        }
                    }
                }
            }
            ProgressEvent::Finished { job, skipped } => {
                let state = self.jobs.remove(&job).unwrap_or_default();
                if skipped {
                    Some(format!("  ok {job}: {} (already present)", state.filename))
                } else {
                    Some(format!(
                        "  ok {job}: {} ({})",
                        state.filename,
                        format_bytes(state.written)
                    ))
                }
            }
            ProgressEvent::Failed { job, reason } => {
                self.jobs.remove(&job);
                Some(format!("  !! {job}: {reason}"))
            }
        }
    }
}

fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b >= KIB * KIB {
        format!("{:.1} MiB", b / (KIB * KIB))
    } else if b >= KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{bytes} B")
    }
}

/// Print events as they arrive; the task ends once the sink is dropped
pub fn spawn_renderer(mut rx: UnboundedReceiver<ProgressEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut renderer = Renderer::default();
        while let Some(event) = rx.recv().await {
            if let Some(line) = renderer.render(event) {
                eprintln!("{line}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(job: &str) -> ProgressEvent {
        ProgressEvent::Started {
            job: job.to_string(),
            filename: format!("{job}.jar"),
        }
    }

    #[test]
    fn test_quarter_steps_are_reported_once() {
        let mut r = Renderer::default();
        assert!(r.render(started("lp")).is_some());
        r.render(ProgressEvent::Total {
            job: "lp".to_string(),
            bytes: Some(100),
        });

        let lines: Vec<String> = [10, 30, 40, 70, 100]
            .into_iter()
            .filter_map(|written| {
                r.render(ProgressEvent::Advanced {
                    job: "lp".to_string(),
                    written,
                })
            })
            .collect();
        assert_eq!(lines, vec!["     lp: 25%", "     lp: 50%"]);

        let done = r
            .render(ProgressEvent::Finished {
                job: "lp".to_string(),
                skipped: false,
            })
            .unwrap();
        assert_eq!(done, "  ok lp: lp.jar (100 B)");
    }

    #[test]
    fn test_unknown_size_prints_bytes_once_per_mebibyte() {
        let mut r = Renderer::default();
        r.render(started("ess"));
        r.render(ProgressEvent::Total {
            job: "ess".to_string(),
            bytes: None,
        });

        const MIB: u64 = 1024 * 1024;
        let lines: Vec<Option<String>> = [4096, MIB + MIB / 2, MIB * 9 / 5, MIB * 21 / 10]
            .into_iter()
            .map(|written| {
                r.render(ProgressEvent::Advanced {
                    job: "ess".to_string(),
                    written,
                })
            })
            .collect();
        assert_eq!(
            lines,
            vec![
                None,
                Some("     ess: 1.5 MiB".to_string()),
                None,
                Some("     ess: 2.1 MiB".to_string()),
            ]
        );
    }

    #[test]
    fn test_skipped_and_failed_lines() {
        let mut r = Renderer::default();
        r.render(started("a"));
        assert_eq!(
            r.render(ProgressEvent::Finished {
                job: "a".to_string(),
                skipped: true,
            })
            .as_deref(),
            Some("  ok a: a.jar (already present)")
        );
        assert_eq!(
            r.render(ProgressEvent::Failed {
                job: "b".to_string(),
                reason: "checksum mismatch".to_string(),
            })
            .as_deref(),
            Some("  !! b: checksum mismatch")
        );
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 + 512 * 1024), "3.5 MiB");
    }
}
