//! Periodic code detection against a live capture source.
//!
//! [`ScanLoop`] is the synchronous core: one `tick` is one frame and one decode
//! attempt. [`PollTask`] drives it from a background thread on a fixed cadence
//! and hands the first detected code back over a channel.

use log::{debug, info, warn};
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One still image (or, for text-fed sources, one raw scanner line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(pub Vec<u8>);

impl Frame {
    pub fn from_text(s: &str) -> Self {
        Frame(s.as_bytes().to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No code visible in this frame. Expected most of the time.
    NotFound,
    Fault(String),
}

pub trait CaptureSource {
    fn is_on(&self) -> bool;
    fn set_on(&mut self, on: bool);
    fn grab_frame(&mut self) -> Option<Frame>;
}

pub trait FrameDecoder {
    fn decode(&mut self, frame: &Frame) -> Result<String, DecodeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    CaptureOff,
}

impl core::fmt::Display for ScanError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ScanError::CaptureOff => write!(f, "turn on the camera before scanning"),
        }
    }
}

impl std::error::Error for ScanError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Loop is not running (never started, stopped, or capture went off).
    Halted,
    NoFrame,
    NoCode,
    Fault(String),
    Detected(String),
}

pub struct ScanLoop<C, D> {
    capture: C,
    decoder: D,
    running: bool,
    attempts: u64,
}

impl<C: CaptureSource, D: FrameDecoder> ScanLoop<C, D> {
    pub fn new(capture: C, decoder: D) -> Self {
        ScanLoop {
            capture,
            decoder,
            running: false,
            attempts: 0,
        }
    }

    pub fn start(&mut self) -> Result<(), ScanError> {
        if !self.capture.is_on() {
            return Err(ScanError::CaptureOff);
        }
        self.running = true;
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Decode attempts made since construction.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn capture(&self) -> &C {
        &self.capture
    }

    /// Flip the capture source. Switching it off halts the loop.
    pub fn toggle_capture(&mut self) -> bool {
        let on = !self.capture.is_on();
        self.capture.set_on(on);
        if !on {
            self.stop();
        }
        on
    }

    pub fn tick(&mut self) -> TickOutcome {
        if !self.running {
            return TickOutcome::Halted;
        }
        if !self.capture.is_on() {
            debug!("Capture source went off; halting scan loop");
            self.running = false;
            return TickOutcome::Halted;
        }
        let Some(frame) = self.capture.grab_frame() else {
            return TickOutcome::NoFrame;
        };
        self.attempts += 1;
        match self.decoder.decode(&frame) {
            Ok(payload) => {
                let code = payload.trim();
                if code.is_empty() {
                    return TickOutcome::NoCode;
                }
                self.running = false;
                TickOutcome::Detected(code.to_string())
            }
            Err(DecodeError::NotFound) => TickOutcome::NoCode,
            Err(DecodeError::Fault(e)) => {
                warn!("QR scanning error: {}", e);
                TickOutcome::Fault(e)
            }
        }
    }
}

/// Background driver for a [`ScanLoop`].
///
/// Ticks run strictly one after another on a single thread, so two decodes are
/// never in flight together; a decode slower than the interval pushes the next
/// tick back. After `cancel` returns no decode starts and no code is delivered.
pub struct PollTask {
    cancel_tx: Option<Sender<()>>,
    detections: Receiver<String>,
    handle: Option<JoinHandle<u64>>,
}

impl PollTask {
    pub fn spawn<C, D>(mut scan: ScanLoop<C, D>, interval: Duration, warmup: Duration) -> Result<PollTask, ScanError>
    where
        C: CaptureSource + Send + 'static,
        D: FrameDecoder + Send + 'static,
    {
        scan.start()?;
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
        let (found_tx, found_rx) = mpsc::channel::<String>();

        let handle = thread::spawn(move || {
            if wait_or_cancelled(&cancel_rx, warmup) {
                return scan.attempts();
            }
            info!("Scanning for QR codes every {}ms", interval.as_millis());
            loop {
                let tick_start = Instant::now();
                let outcome = scan.tick();
                if cancelled(&cancel_rx) {
                    break;
                }
                match outcome {
                    TickOutcome::Detected(code) => {
                        info!("QR code detected: {}", code);
                        let _ = found_tx.send(code);
                        break;
                    }
                    TickOutcome::Halted => break,
                    _ => {}
                }
                // Maintain steady cadence
                let elapsed = tick_start.elapsed();
                let wait = interval.saturating_sub(elapsed);
                if wait_or_cancelled(&cancel_rx, wait) {
                    break;
                }
            }
            scan.attempts()
        });

        Ok(PollTask {
            cancel_tx: Some(cancel_tx),
            detections: found_rx,
            handle: Some(handle),
        })
    }

    /// Block until a code is detected or the loop halts on its own.
    pub fn wait(&self) -> Option<String> {
        self.detections.recv().ok()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<String> {
        self.detections.recv_timeout(timeout).ok()
    }

    /// Stop polling and wait for the worker to exit. Returns the decode count.
    pub fn cancel(&mut self) -> u64 {
        self.cancel_tx.take();
        match self.handle.take() {
            Some(h) => h.join().unwrap_or_default(),
            None => 0,
        }
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn cancelled(rx: &Receiver<()>) -> bool {
    !matches!(rx.try_recv(), Err(TryRecvError::Empty))
}

fn wait_or_cancelled(rx: &Receiver<()>, wait: Duration) -> bool {
    if wait.is_zero() {
        return cancelled(rx);
    }
    !matches!(rx.recv_timeout(wait), Err(RecvTimeoutError::Timeout))
}

// =====================
// Text-fed capture
// =====================

/// Capture source fed by an external scanner that prints one decoded payload
/// per line (e.g. `zbarcam --raw`). The source switches itself off at EOF.
pub struct LineCapture {
    lines: Receiver<String>,
    on: bool,
}

impl LineCapture {
    pub fn spawn<R: BufRead + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(l) => {
                        if tx.send(l).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("scanner input read failed: {}", e);
                        break;
                    }
                }
            }
        });
        LineCapture { lines: rx, on: true }
    }
}

impl CaptureSource for LineCapture {
    fn is_on(&self) -> bool {
        self.on
    }

    fn set_on(&mut self, on: bool) {
        self.on = on;
    }

    fn grab_frame(&mut self) -> Option<Frame> {
        match self.lines.try_recv() {
            Ok(line) => Some(Frame(line.into_bytes())),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                debug!("scanner input closed");
                self.on = false;
                None
            }
        }
    }
}

/// Decoder for frames that already carry the payload as text.
#[derive(Debug, Default)]
pub struct TextPayloadDecoder;

impl FrameDecoder for TextPayloadDecoder {
    fn decode(&mut self, frame: &Frame) -> Result<String, DecodeError> {
        let text = std::str::from_utf8(&frame.0).map_err(|e| DecodeError::Fault(e.to_string()))?;
        let text = text.trim();
        let payload = text.strip_prefix("QR-Code:").unwrap_or(text).trim();
        if payload.is_empty() {
            Err(DecodeError::NotFound)
        } else {
            Ok(payload.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeCamera {
        on: bool,
    }

    impl CaptureSource for FakeCamera {
        fn is_on(&self) -> bool {
            self.on
        }
        fn set_on(&mut self, on: bool) {
            self.on = on;
        }
        fn grab_frame(&mut self) -> Option<Frame> {
            Some(Frame(vec![0; 4]))
        }
    }

    struct ScriptedDecoder {
        script: VecDeque<Result<String, DecodeError>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedDecoder {
        fn new(script: Vec<Result<String, DecodeError>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                ScriptedDecoder {
                    script: script.into(),
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    impl FrameDecoder for ScriptedDecoder {
        fn decode(&mut self, _frame: &Frame) -> Result<String, DecodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script.pop_front().unwrap_or(Err(DecodeError::NotFound))
        }
    }

    #[test]
    fn refuses_to_start_with_capture_off() {
        let (decoder, _) = ScriptedDecoder::new(vec![]);
        let mut scan = ScanLoop::new(FakeCamera { on: false }, decoder);
        assert_eq!(scan.start(), Err(ScanError::CaptureOff));
        assert_eq!(scan.tick(), TickOutcome::Halted);
    }

    #[test]
    fn first_detection_trims_and_halts() {
        let (decoder, calls) = ScriptedDecoder::new(vec![
            Err(DecodeError::NotFound),
            Err(DecodeError::Fault("checksum".into())),
            Ok("  ABCD1234EFGH5678\n".into()),
            Ok("SECOND".into()),
        ]);
        let mut scan = ScanLoop::new(FakeCamera { on: true }, decoder);
        scan.start().unwrap();
        assert_eq!(scan.tick(), TickOutcome::NoCode);
        assert_eq!(scan.tick(), TickOutcome::Fault("checksum".into()));
        assert!(scan.is_running());
        assert_eq!(scan.tick(), TickOutcome::Detected("ABCD1234EFGH5678".into()));
        assert!(!scan.is_running());
        assert_eq!(scan.tick(), TickOutcome::Halted);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        scan.start().unwrap();
        assert_eq!(scan.tick(), TickOutcome::Detected("SECOND".into()));
    }

    #[test]
    fn capture_off_stops_further_decodes() {
        let (decoder, calls) = ScriptedDecoder::new(vec![]);
        let mut scan = ScanLoop::new(FakeCamera { on: true }, decoder);
        scan.start().unwrap();
        assert_eq!(scan.tick(), TickOutcome::NoCode);
        assert!(!scan.toggle_capture());
        for _ in 0..10 {
            assert_eq!(scan.tick(), TickOutcome::Halted);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!scan.is_running());
    }

    #[test]
    fn poll_task_delivers_first_code() {
        let (decoder, calls) =
            ScriptedDecoder::new(vec![Err(DecodeError::NotFound), Err(DecodeError::NotFound), Ok(" CODE ".into())]);
        let scan = ScanLoop::new(FakeCamera { on: true }, decoder);
        let mut task = PollTask::spawn(scan, Duration::from_millis(2), Duration::ZERO).unwrap();
        assert_eq!(task.wait_timeout(Duration::from_secs(5)).as_deref(), Some("CODE"));
        assert_eq!(task.cancel(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn cancelled_poll_task_makes_no_more_decode_calls() {
        let (decoder, calls) = ScriptedDecoder::new(vec![]);
        let scan = ScanLoop::new(FakeCamera { on: true }, decoder);
        let mut task = PollTask::spawn(scan, Duration::from_millis(2), Duration::ZERO).unwrap();
        thread::sleep(Duration::from_millis(20));
        task.cancel();
        let after_cancel = calls.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(calls.load(Ordering::SeqCst), after_cancel);
        assert_eq!(task.wait_timeout(Duration::from_millis(5)), None);
    }

    #[test]
    fn cancel_during_warmup_skips_decoding() {
        let (decoder, calls) = ScriptedDecoder::new(vec![Ok("CODE".into())]);
        let scan = ScanLoop::new(FakeCamera { on: true }, decoder);
        let mut task = PollTask::spawn(scan, Duration::from_millis(2), Duration::from_secs(30)).unwrap();
        assert_eq!(task.cancel(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn line_capture_feeds_text_decoder_and_goes_off_at_eof() {
        let input = Cursor::new("\n\nQR-Code:ABCD1234EFGH5678\n");
        let scan = ScanLoop::new(LineCapture::spawn(input), TextPayloadDecoder);
        let mut task = PollTask::spawn(scan, Duration::from_millis(1), Duration::ZERO).unwrap();
        assert_eq!(task.wait_timeout(Duration::from_secs(5)).as_deref(), Some("ABCD1234EFGH5678"));
        task.cancel();

        let scan = ScanLoop::new(LineCapture::spawn(Cursor::new("\n")), TextPayloadDecoder);
        let task = PollTask::spawn(scan, Duration::from_millis(1), Duration::ZERO).unwrap();
        assert_eq!(task.wait_timeout(Duration::from_secs(5)), None);
    }
}
