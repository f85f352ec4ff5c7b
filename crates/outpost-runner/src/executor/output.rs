//! Output accounting and decoding for job pipes.

/// Combined stdout+stderr byte cap per job.
pub const OUTPUT_CAP_BYTES: usize = 50 * 1024;

/// Sent once, in place of output, when a job exceeds its output cap.
pub const TRUNCATION_MARKER: &str = "\n[output truncated: exceeded 50 KB limit]\n";

/// What to do with a chunk just read from a pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Forward the chunk.
    Forward,
    /// The cap was just crossed: forward the truncation marker instead.
    Truncate,
    /// Already truncated: drop the chunk.
    Drop,
}

/// Running byte count shared by both pipes of one job.
///
/// The count never decreases, and once truncated every later chunk is
/// dropped.
#[derive(Debug)]
pub struct OutputBudget {
    cap: usize,
    used: usize,
    truncated: bool,
}

impl OutputBudget {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            used: 0,
            truncated: false,
        }
    }

    pub fn admit(&mut self, len: usize) -> Admission {
        self.used = self.used.saturating_add(len);
        if self.truncated {
            Admission::Drop
        } else if self.used > self.cap {
            self.truncated = true;
            Admission::Truncate
        } else {
            Admission::Forward
        }
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

/// Incremental UTF-8 decoder that holds back a sequence split across reads.
///
/// Invalid bytes are replaced with U+FFFD, like `String::from_utf8_lossy`.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decode `bytes`, keeping an incomplete trailing sequence for the next call.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let keep = incomplete_suffix_len(&self.pending);
        let ready = self.pending.len() - keep;
        let text = String::from_utf8_lossy(&self.pending[..ready]).into_owned();
        self.pending.drain(..ready);
        text
    }

    /// Flush whatever is still held back.
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Length of a truncated-but-so-far-valid UTF-8 sequence at the end of `bytes`.
fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => 0,
        // error_len() == None means "unexpected end of input".
        Err(e) if e.error_len().is_none() => bytes.len() - e.valid_up_to(),
        Err(e) => {
            // Invalid bytes in the middle; check only the tail after them.
            let rest = &bytes[e.valid_up_to() + e.error_len().unwrap_or(1)..];
            incomplete_suffix_len(rest)
        }
    }
}
