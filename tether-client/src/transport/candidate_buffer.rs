use std::collections::VecDeque;

/// Holds remote candidates until the remote description is in place.
///
/// Once [`CandidateBuffer::mark_applied`] has been called the buffer is drained
/// in arrival order exactly once, and every later candidate passes straight through.
#[derive(Debug)]
pub struct CandidateBuffer<T> {
    pending: VecDeque<T>,
    remote_applied: bool,
}

impl<T> Default for CandidateBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CandidateBuffer<T> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            remote_applied: false,
        }
    }

    pub fn is_remote_applied(&self) -> bool {
        self.remote_applied
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Returns the candidate back when it may be applied right away.
    pub fn offer(&mut self, candidate: T) -> Option<T> {
        if self.remote_applied {
            return Some(candidate);
        }
        self.pending.push_back(candidate);
        None
    }

    /// Records that the remote description is applied and hands out the backlog.
    pub fn mark_applied(&mut self) -> Vec<T> {
        if self.remote_applied {
            return Vec::new();
        }
        self.remote_applied = true;
        self.pending.drain(..).collect()
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.remote_applied = false;
    }
}
