//! The capture loop: read a frame, hand it to a stage, repeat until told
//! to stop, the time limit passes, or the source runs dry.

use crate::stop::StopSignal;
use alterego_hw::{Frame, FrameSource};
use std::time::{Duration, Instant};

/// Per-frame work plugged into the loop.
///
/// An error ends the loop and is returned to the caller.
pub trait Stage {
    fn process(&mut self, frame: Frame) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Ctrl-C or the quit key.
    Interrupted,
    TimeLimit,
    /// The frame source failed or has no more frames.
    EndOfStream,
}

#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub frames: u64,
    pub elapsed: Duration,
    pub reason: StopReason,
}

pub struct LoopDriver {
    stop: StopSignal,
    time_limit: Option<Duration>,
}

impl LoopDriver {
    pub fn new(stop: StopSignal) -> Self {
        Self {
            stop,
            time_limit: None,
        }
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn run<S, T>(&self, source: &mut S, stage: &mut T) -> anyhow::Result<RunSummary>
    where
        S: FrameSource + ?Sized,
        T: Stage + ?Sized,
    {
        let start = Instant::now();
        let mut frames = 0u64;

        let reason = loop {
            if self.stop.is_triggered() {
                break StopReason::Interrupted;
            }

            let frame = match source.read() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::info!(error = %e, frames, "frame source ended");
                    break StopReason::EndOfStream;
                }
            };

            stage.process(frame)?;
            frames += 1;

            if let Some(limit) = self.time_limit {
                if start.elapsed() >= limit {
                    break StopReason::TimeLimit;
                }
            }
        };

        let summary = RunSummary {
            frames,
            elapsed: start.elapsed(),
            reason,
        };
        tracing::info!(
            frames = summary.frames,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            reason = ?summary.reason,
            "capture loop finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alterego_hw::CameraError;

    /// Yields `frames` blank frames, then fails like an unplugged camera.
    struct ScriptedSource {
        remaining: u32,
        next_seq: u32,
        delay: Duration,
        width: u32,
        height: u32,
    }

    impl ScriptedSource {
        fn new(frames: u32) -> Self {
            Self {
                remaining: frames,
                next_seq: 0,
                delay: Duration::ZERO,
                width: 32,
                height: 24,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn read(&mut self) -> Result<Frame, CameraError> {
            if self.remaining == 0 {
                return Err(CameraError::Read(std::io::ErrorKind::UnexpectedEof.into()));
            }
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            self.remaining -= 1;
            self.next_seq += 1;
            let data = vec![90u8; (self.width * self.height * 3) as usize];
            Ok(Frame::new(data, self.width, self.height, self.next_seq))
        }
    }

    #[derive(Default)]
    struct Counter {
        seen: Vec<u32>,
        stop_after: Option<(usize, StopSignal)>,
    }

    impl Stage for Counter {
        fn process(&mut self, frame: Frame) -> anyhow::Result<()> {
            self.seen.push(frame.sequence);
            if let Some((n, stop)) = &self.stop_after {
                if self.seen.len() >= *n {
                    stop.trigger();
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_end_of_stream_after_last_frame() {
        // Fourth read fails, so exactly three iterations run.
        let mut source = ScriptedSource::new(3);
        let mut stage = Counter::default();
        let summary = LoopDriver::new(StopSignal::new())
            .run(&mut source, &mut stage)
            .unwrap();

        assert_eq!(summary.reason, StopReason::EndOfStream);
        assert_eq!(summary.frames, 3);
        assert_eq!(stage.seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_source_runs_no_iterations() {
        let mut source = ScriptedSource::new(0);
        let mut stage = Counter::default();
        let summary = LoopDriver::new(StopSignal::new())
            .run(&mut source, &mut stage)
            .unwrap();
        assert_eq!(summary.frames, 0);
        assert_eq!(summary.reason, StopReason::EndOfStream);
    }

    #[test]
    fn test_time_limit_bounds_run() {
        let mut source = ScriptedSource::new(10_000);
        source.delay = Duration::from_millis(2);
        let mut stage = Counter::default();
        let limit = Duration::from_millis(40);

        let summary = LoopDriver::new(StopSignal::new())
            .with_time_limit(limit)
            .run(&mut source, &mut stage)
            .unwrap();

        assert_eq!(summary.reason, StopReason::TimeLimit);
        assert!(summary.elapsed >= limit);
        assert!(summary.frames < 10_000);
    }

    #[test]
    fn test_stop_signal_ends_loop_after_current_frame() {
        let stop = StopSignal::new();
        let mut source = ScriptedSource::new(100);
        let mut stage = Counter {
            stop_after: Some((5, stop.clone())),
            ..Default::default()
        };

        let summary = LoopDriver::new(stop).run(&mut source, &mut stage).unwrap();
        assert_eq!(summary.reason, StopReason::Interrupted);
        assert_eq!(summary.frames, 5);
    }

    #[test]
    fn test_stage_error_is_fatal() {
        struct Failing;
        impl Stage for Failing {
            fn process(&mut self, _frame: Frame) -> anyhow::Result<()> {
                anyhow::bail!("disk full")
            }
        }

        let mut source = ScriptedSource::new(5);
        let err = LoopDriver::new(StopSignal::new())
            .run(&mut source, &mut Failing)
            .unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert_eq!(source.remaining, 4);
    }
}
