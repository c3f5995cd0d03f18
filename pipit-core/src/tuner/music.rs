use super::command::Callback;

/// Completion bookkeeping for one multi-part piece.
pub(crate) struct MusicSession {
    pub pattern: usize,
    pub total: usize,
    /// Holes are counted up front
    pub completed: usize,
    pub on_all_finished: Option<Callback>,
}

impl MusicSession {
    pub fn new(pattern: usize, total: usize, holes: usize, on_all_finished: Option<Callback>) -> Self {
        Self {
            pattern,
            total,
            completed: holes.min(total),
            on_all_finished,
        }
    }

    /// Count one finished part. True once every part has been accounted for.
    pub fn complete_part(&mut self) -> bool {
        self.completed = (self.completed + 1).min(self.total);
        self.is_done()
    }

    pub fn is_done(&self) -> bool {
        self.completed >= self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holes_precounted() {
        let mut session = MusicSession::new(0, 3, 1, None);
        assert!(!session.is_done());
        assert!(!session.complete_part());
        assert!(session.complete_part());
    }

    #[test]
    fn test_all_holes() {
        assert!(MusicSession::new(0, 2, 2, None).is_done());
        assert!(MusicSession::new(0, 0, 0, None).is_done());
    }
}
