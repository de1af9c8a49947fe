use std::io::{self, Read};

use crate::{Result, StreamError};

/// A reader that can record the bytes passing through it.
///
/// While recording is active, every byte actually delivered to the consumer
/// is mirrored into an internal buffer. The buffer is used to preserve the
/// raw prefix of an object whose serialization was interrupted by an
/// exception, so that the unparseable remainder is still available to the
/// caller.
pub struct RecordingReader<R> {
    inner: R,
    recorded: Vec<u8>,
    recording: bool,
}

impl<R: Read> RecordingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            recorded: Vec::new(),
            recording: false,
        }
    }

    /// Starts recording, clearing any previously recorded bytes.
    pub fn start_recording(&mut self) {
        self.recording = true;
        self.recorded.clear();
    }

    /// Stops recording and discards the buffer.
    pub fn stop_recording(&mut self) -> Result<()> {
        if !self.recording {
            return Err(StreamError::RecordingInactive);
        }
        self.recorded = Vec::new();
        self.recording = false;
        Ok(())
    }

    /// A copy of the bytes recorded so far; empty when not recording.
    pub fn snapshot(&self) -> Vec<u8> {
        if !self.recording {
            return Vec::new();
        }
        self.recorded.clone()
    }

    /// Skips `n` bytes. Skipped bytes pass through `read`, so they land in
    /// the recording buffer like any other delivered byte.
    pub fn skip(&mut self, mut n: u64) -> io::Result<u64> {
        let mut scratch = [0u8; 8192];
        let mut skipped = 0;
        while n > 0 {
            let want = n.min(scratch.len() as u64) as usize;
            let got = self.read(&mut scratch[..want])?;
            if got == 0 {
                break;
            }
            skipped += got as u64;
            n -= got as u64;
        }
        Ok(skipped)
    }
}

impl<R: Read> Read for RecordingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if self.recording && n > 0 {
            self.recorded.extend_from_slice(&buf[..n]);
        }
        Ok(n)
    }
}
