//! MJPEG 推流：`multipart/x-mixed-replace` 无限响应
//!
//! 每个连接一个 `StreamSession`，每次 `step` 至多取出并写出一帧，
//! 帧在写完后立即归还，然后让出 CPU。

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const BOUNDARY: &str = "frame";

/// Response headers that open the unbounded multipart body.
pub const STREAM_HEADERS: [(&str, &str); 3] = [
    ("Content-Type", "multipart/x-mixed-replace; boundary=frame"),
    ("Cache-Control", "no-cache"),
    ("Access-Control-Allow-Origin", "*"),
];

/// Produces encoded images on demand.
///
/// Dropping a `Frame` hands its buffer back to the source, so release happens
/// on every path out of the scope that holds it.
pub trait FrameSource {
    type Frame: AsRef<[u8]>;

    /// `None` means no frame right now; not an error.
    fn capture(&self) -> Option<Self::Frame>;
}

impl<T: FrameSource + ?Sized> FrameSource for &T {
    type Frame = T::Frame;

    fn capture(&self) -> Option<Self::Frame> {
        (**self).capture()
    }
}

/// Per-part header, written before the image bytes.
pub fn part_header(len: usize) -> String {
    format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY, len
    )
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub yield_interval: Duration,
    /// Concurrent viewers. Each one can hold a driver frame buffer, so this
    /// must not exceed the buffer count.
    pub max_sessions: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            yield_interval: Duration::from_millis(1),
            max_sessions: 2,
        }
    }
}

/// Counts live stream sessions against a fixed limit.
#[derive(Debug)]
pub struct StreamSlots {
    active: AtomicUsize,
    limit: usize,
}

impl StreamSlots {
    pub fn new(limit: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            limit,
        }
    }

    /// `None` when every slot is taken. The slot frees itself on drop.
    pub fn try_acquire(&self) -> Option<StreamSlot<'_>> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .ok()
            .map(|_| StreamSlot { slots: self })
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

pub struct StreamSlot<'a> {
    slots: &'a StreamSlots,
}

impl Drop for StreamSlot<'_> {
    fn drop(&mut self) {
        self.slots.active.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Transport reported closed; the session is over.
    Closed,
    /// Source had nothing; try again next step.
    Skipped,
    /// One part written, carrying this many image bytes.
    Sent(usize),
    /// Write failed part way; the frame was still released.
    WriteFailed,
}

pub struct StreamSession<F: FrameSource> {
    source: F,
    config: StreamConfig,
    broken: bool,
    frames_sent: u64,
}

impl<F: FrameSource> StreamSession<F> {
    pub fn new(source: F, config: StreamConfig) -> Self {
        Self {
            source,
            config,
            broken: false,
            frames_sent: 0,
        }
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// One loop iteration: check the transport, take a frame, write one part.
    pub fn step<W, P>(&mut self, out: &mut W, is_open: &mut P) -> StepOutcome
    where
        W: Write,
        P: FnMut(&W) -> bool,
    {
        if self.broken || !is_open(&*out) {
            return StepOutcome::Closed;
        }

        let Some(frame) = self.source.capture() else {
            return StepOutcome::Skipped;
        };

        let bytes = frame.as_ref();
        let len = bytes.len();
        let written = write_part(out, bytes);
        drop(frame);

        match written {
            Ok(()) => {
                self.frames_sent += 1;
                StepOutcome::Sent(len)
            }
            Err(e) => {
                log::info!("Stream write failed: {}", e);
                self.broken = true;
                StepOutcome::WriteFailed
            }
        }
    }

    /// Drives steps until the transport closes, yielding after each one.
    pub fn run<W, P>(&mut self, out: &mut W, mut is_open: P) -> u64
    where
        W: Write,
        P: FnMut(&W) -> bool,
    {
        loop {
            if self.step(out, &mut is_open) == StepOutcome::Closed {
                break;
            }
            self.pause();
        }
        self.frames_sent
    }

    fn pause(&self) {
        if self.config.yield_interval.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(self.config.yield_interval);
        }
    }
}

fn write_part<W: Write>(out: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    out.write_all(part_header(bytes.len()).as_bytes())?;
    out.write_all(bytes)?;
    out.write_all(b"\r\n")?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FailingWriter, ScriptedFrames};

    fn quick() -> StreamConfig {
        StreamConfig {
            yield_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn test_part_header() {
        assert_eq!(
            part_header(1234),
            "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 1234\r\n\r\n"
        );
    }

    #[test]
    fn test_closed_transport_never_captures() {
        let frames = ScriptedFrames::new(vec![Some(vec![1, 2, 3])]);
        let mut session = StreamSession::new(frames.clone(), StreamConfig::default());
        let mut out = Vec::new();

        let outcome = session.step(&mut out, &mut |_: &Vec<u8>| false);

        assert_eq!(outcome, StepOutcome::Closed);
        assert_eq!(frames.checkouts(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_mixed_outcomes_release_every_frame() {
        let script = vec![
            Some(vec![0xff, 0xd8, 0x01, 0xff, 0xd9]),
            None,
            None,
            Some(vec![0xff, 0xd8, 0xff, 0xd9]),
            None,
            Some(vec![0xaa; 300]),
        ];
        let frames = ScriptedFrames::new(script);
        let mut session = StreamSession::new(frames.clone(), StreamConfig::default());
        let mut out = Vec::new();

        let mut outcomes = Vec::new();
        for _ in 0..6 {
            outcomes.push(session.step(&mut out, &mut |_: &Vec<u8>| true));
            assert_eq!(frames.outstanding(), 0);
        }

        assert_eq!(
            outcomes,
            vec![
                StepOutcome::Sent(5),
                StepOutcome::Skipped,
                StepOutcome::Skipped,
                StepOutcome::Sent(4),
                StepOutcome::Skipped,
                StepOutcome::Sent(300),
            ]
        );
        assert_eq!(frames.checkouts(), 3);
        assert_eq!(frames.releases(), 3);
        assert_eq!(frames.max_outstanding(), 1);
        assert_eq!(session.frames_sent(), 3);

        let mut expected = Vec::new();
        expected.extend_from_slice(part_header(5).as_bytes());
        expected.extend_from_slice(&[0xff, 0xd8, 0x01, 0xff, 0xd9]);
        expected.extend_from_slice(b"\r\n");
        assert!(out.starts_with(&expected));
    }

    #[test]
    fn test_write_failure_releases_and_closes() {
        let frames = ScriptedFrames::repeating(vec![7; 64]);
        let mut session = StreamSession::new(frames.clone(), StreamConfig::default());
        let mut out = FailingWriter::after(10);

        let first = session.step(&mut out, &mut |_: &FailingWriter| true);
        let second = session.step(&mut out, &mut |_: &FailingWriter| true);

        assert_eq!(first, StepOutcome::WriteFailed);
        assert_eq!(second, StepOutcome::Closed);
        assert_eq!(frames.checkouts(), 1);
        assert_eq!(frames.releases(), 1);
        assert_eq!(frames.outstanding(), 0);
    }

    #[test]
    fn test_run_exits_when_predicate_flips() {
        let frames = ScriptedFrames::repeating(vec![1; 16]);
        let mut session = StreamSession::new(frames.clone(), quick());
        let mut out = Vec::new();

        let sent = session.run(&mut out, |w: &Vec<u8>| w.len() < 200);

        // each part is 75 bytes: 57 header + 16 image + 2 trailer
        assert_eq!(sent, 3);
        assert_eq!(frames.releases(), 3);
        assert_eq!(frames.outstanding(), 0);
    }

    #[test]
    fn test_slots_cap_concurrent_sessions() {
        let slots = StreamSlots::new(2);
        let first = slots.try_acquire();
        let second = slots.try_acquire();
        assert!(first.is_some() && second.is_some());
        assert!(slots.try_acquire().is_none());
        assert_eq!(slots.active(), 2);

        drop(first);
        assert_eq!(slots.active(), 1);
        assert!(slots.try_acquire().is_some());
        assert_eq!(slots.active(), 1);
    }
}
