use crate::{catalog::SortHint, observability::log_warn};

/// Resume point of the incremental duplicate lookup.
///
/// Holds the sort hint of the most recent sealed object an earlier fresh
/// scan found still being created. A resumed scan treats every object at or
/// below it as already accounted for. Unset until the first fresh scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResumeCursor {
    last_invisible: Option<SortHint>,
}

impl ResumeCursor {
    /// Unset cursor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current position.
    pub fn get(&self) -> Option<SortHint> {
        self.last_invisible
    }

    /// `true` when `hint` is at or below the cursor.
    pub fn covers(&self, hint: SortHint) -> bool {
        self.last_invisible.is_some_and(|last| hint <= last)
    }

    /// Move to `candidate` unless that would move backwards.
    ///
    /// Returns `true` when the position changed.
    pub(crate) fn advance(&mut self, candidate: SortHint) -> bool {
        match self.last_invisible {
            Some(last) if candidate < last => {
                log_warn!(
                    component = "lookup",
                    event = "cursor_regression_ignored",
                    current = %last,
                    candidate = %candidate,
                );
                false
            }
            Some(last) if candidate == last => false,
            _ => {
                self.last_invisible = Some(candidate);
                true
            }
        }
    }
}
