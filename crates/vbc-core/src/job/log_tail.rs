use std::collections::VecDeque;

/// The last `capacity` committed output lines of a job.
#[derive(Debug, Clone)]
pub(crate) struct LogTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LogTail {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(256)),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub(crate) fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    /// Up to `n` most recent non-blank lines, oldest first.
    pub(crate) fn last_lines(&self, n: usize) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .lines
            .iter()
            .rev()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .take(n)
            .collect();
        out.reverse();
        out
    }
}
