//! Failure-detection heuristic (§4.11): a last-resort scan for providers
//! that surface an error in the assistant text body instead of a failure
//! stop reason.

/// Fixed, stable set of markers. Deliberately short - broadening this list
/// risks false positives on legitimate output that happens to mention one
/// of these words.
const ERROR_MARKERS: &[&str] = &["Error:", "Failed to", "FATAL:", "panicked at"];

const SCAN_WINDOW: usize = 512;

/// Returns the marker that matched, if any. Callers must only invoke this
/// on a final turn that made no tool calls - it is not a general-purpose
/// error detector.
pub fn scan_for_error_markers(final_text: &str) -> Option<&'static str> {
    let tail_start = final_text.len().saturating_sub(SCAN_WINDOW);
    let tail = &final_text[floor_char_boundary(final_text, tail_start)..];
    ERROR_MARKERS.iter().find(|marker| tail.contains(*marker)).copied()
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
