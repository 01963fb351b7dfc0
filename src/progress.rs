/// Tracks the last candidate prefix that was logged, so progress output
/// shows one line per prefix instead of one per request.
#[derive(Debug, Clone)]
pub struct PrefixTracker {
    width: usize,
    last: Option<String>,
}

impl PrefixTracker {
    pub fn new(width: usize) -> Self {
        Self { width, last: None }
    }

    /// Record `candidate`, returning true if its prefix differs from the
    /// previously recorded one.
    pub fn observe(&mut self, candidate: &str) -> bool {
        let prefix: String = candidate.chars().take(self.width).collect();
        if self.last.as_deref() == Some(prefix.as_str()) {
            return false;
        }
        self.last = Some(prefix);
        true
    }
}
