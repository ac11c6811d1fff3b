//! Bounded byte accumulation for one side of an exchange

use crate::capture::codec::BodySource;
use bytes::BytesMut;

/// Result of offering a chunk to a [`ByteAccumulator`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// This chunk pushed the capture past its limit
    Overflowed,
    /// The capture had already overflowed; the chunk was not kept
    Ignored,
}

#[derive(Debug)]
enum State {
    Collecting(BytesMut),
    Overflowed,
}

/// Append-only buffer that gives up once it would exceed its limit.
///
/// Chunks are kept in arrival order. The first chunk that would take the
/// total past `limit` releases everything buffered so far and the accumulator
/// stays overflowed for the rest of the exchange.
#[derive(Debug)]
pub struct ByteAccumulator {
    limit: usize,
    state: State,
}

impl ByteAccumulator {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            state: State::Collecting(BytesMut::new()),
        }
    }

    pub fn append(&mut self, chunk: &[u8]) -> AppendOutcome {
        match &mut self.state {
            State::Overflowed => AppendOutcome::Ignored,
            State::Collecting(buffer) => {
                if buffer.len().saturating_add(chunk.len()) > self.limit {
                    self.state = State::Overflowed;
                    AppendOutcome::Overflowed
                } else {
                    buffer.extend_from_slice(chunk);
                    AppendOutcome::Appended
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        match &self.state {
            State::Collecting(buffer) => buffer.len(),
            State::Overflowed => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(&self.state, State::Collecting(buffer) if buffer.is_empty())
    }

    pub fn is_overflowed(&self) -> bool {
        matches!(self.state, State::Overflowed)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Freeze the capture. An accumulator that never saw a byte yields nothing.
    pub fn finish(self) -> Option<BodySource> {
        match self.state {
            State::Overflowed => Some(BodySource::Overflowed),
            State::Collecting(buffer) if buffer.is_empty() => None,
            State::Collecting(buffer) => Some(BodySource::Bytes(buffer.freeze())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_are_kept_in_order() {
        let mut accumulator = ByteAccumulator::new(16);
        assert_eq!(accumulator.append(b"hello "), AppendOutcome::Appended);
        assert_eq!(accumulator.append(b"world"), AppendOutcome::Appended);
        assert_eq!(accumulator.append(b""), AppendOutcome::Appended);
        assert_eq!(accumulator.len(), 11);

        match accumulator.finish() {
            Some(BodySource::Bytes(bytes)) => assert_eq!(&bytes[..], b"hello world"),
            other => panic!("unexpected capture: {other:?}"),
        }
    }

    #[test]
    fn test_capture_at_exact_limit_is_kept() {
        let mut accumulator = ByteAccumulator::new(4);
        assert_eq!(accumulator.append(b"abcd"), AppendOutcome::Appended);
        assert!(!accumulator.is_overflowed());
    }

    #[test]
    fn test_overflow_is_sticky() {
        let mut accumulator = ByteAccumulator::new(4);
        assert_eq!(accumulator.append(b"abc"), AppendOutcome::Appended);
        assert_eq!(accumulator.append(b"de"), AppendOutcome::Overflowed);
        assert!(accumulator.is_overflowed());
        // Small chunks that would have fit are still refused
        assert_eq!(accumulator.append(b"f"), AppendOutcome::Ignored);
        assert_eq!(accumulator.len(), 0);
        assert!(matches!(accumulator.finish(), Some(BodySource::Overflowed)));
    }

    #[test]
    fn test_empty_accumulator_yields_nothing() {
        let accumulator = ByteAccumulator::new(4);
        assert!(accumulator.is_empty());
        assert!(accumulator.finish().is_none());
    }
}
