// src/system/stack/scanner.rs

/// Decides readiness from a stream of text chunks.
pub trait ReadinessProbe: Send {
    /// Feeds the next chunk of merged process output.
    fn feed(&mut self, chunk: &str);
    /// Whether the coarse marker has been seen.
    fn is_armed(&self) -> bool;
    /// Whether the terminal marker has been seen while armed.
    fn is_ready(&self) -> bool;
}

/// A two-phase substring matcher.
///
/// The arm marker must appear before the ready marker counts. Text preceding
/// the arm marker is never searched for the ready marker. Markers split across
/// chunk boundaries are still found. An empty ready marker never matches, so
/// such a probe only settles through the process exit.
#[derive(Debug, Clone)]
pub struct MarkerScanner {
    arm_marker: Option<String>,
    ready_marker: String,
    armed: bool,
    ready: bool,
    carry: String,
}

impl MarkerScanner {
    /// Without an arm marker the scanner is armed from the start.
    pub fn new(arm_marker: Option<&str>, ready_marker: &str) -> Self {
        let arm_marker = arm_marker.filter(|m| !m.is_empty()).map(str::to_string);
        Self {
            armed: arm_marker.is_none(),
            arm_marker,
            ready_marker: ready_marker.to_string(),
            ready: false,
            carry: String::new(),
        }
    }
}

impl ReadinessProbe for MarkerScanner {
    fn feed(&mut self, chunk: &str) {
        if self.ready {
            return;
        }
        let mut text = std::mem::take(&mut self.carry);
        text.push_str(chunk);

        let searchable = if self.armed {
            text.as_str()
        } else {
            let arm = self.arm_marker.as_deref().unwrap_or_default();
            match text.split_once(arm) {
                Some((_, after)) => {
                    log::debug!("Arm marker '{}' seen.", arm);
                    self.armed = true;
                    after
                }
                None => {
                    self.carry = tail(&text, arm.len().saturating_sub(1));
                    return;
                }
            }
        };

        if !self.ready_marker.is_empty() && searchable.contains(self.ready_marker.as_str()) {
            log::debug!("Ready marker '{}' seen.", self.ready_marker);
            self.ready = true;
        } else {
            self.carry = tail(searchable, self.ready_marker.len().saturating_sub(1));
        }
    }

    fn is_armed(&self) -> bool {
        self.armed
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}

/// The last `keep` bytes of `s`, shortened to a char boundary.
fn tail(s: &str, keep: usize) -> String {
    let mut start = s.len().saturating_sub(keep);
    while !s.is_char_boundary(start) {
        start += 1;
    }
    s.get(start..).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> MarkerScanner {
        MarkerScanner::new(Some("copying:"), "config preparation complete")
    }

    #[test]
    fn test_arm_then_ready() {
        let mut s = scanner();
        s.feed("db-init  | copying: file.sql\n");
        assert!(s.is_armed());
        assert!(!s.is_ready());

        s.feed("db-init  | ... config preparation complete\n");
        assert!(s.is_ready());
    }

    #[test]
    fn test_ready_without_arm_never_completes() {
        let mut s = scanner();
        s.feed("... config preparation complete\n");
        assert!(!s.is_armed());
        assert!(!s.is_ready());
    }

    #[test]
    fn test_ready_before_arm_in_same_chunk_does_not_count() {
        let mut s = scanner();
        s.feed("config preparation complete\ncopying: a.sql\n");
        assert!(s.is_armed());
        assert!(!s.is_ready());

        s.feed("config preparation complete\n");
        assert!(s.is_ready());
    }

    #[test]
    fn test_markers_split_across_chunks() {
        let mut s = scanner();
        s.feed("cop");
        s.feed("ying: seed.sql\nconfig prep");
        assert!(s.is_armed());
        assert!(!s.is_ready());
        s.feed("aration complete");
        assert!(s.is_ready());
    }

    #[test]
    fn test_without_arm_marker_starts_armed() {
        let mut s = MarkerScanner::new(None, "Removed");
        assert!(s.is_armed());
        s.feed("Container dev-db-1  Removed\n");
        assert!(s.is_ready());
    }

    #[test]
    fn test_empty_ready_marker_never_matches() {
        let mut s = MarkerScanner::new(None, "");
        s.feed("Container dev-db-1  Removed\n");
        assert!(s.is_armed());
        assert!(!s.is_ready());
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        assert_eq!(tail("abcé", 1), "");
        assert_eq!(tail("abcé", 2), "é");
        assert_eq!(tail("abc", 10), "abc");
    }
}
