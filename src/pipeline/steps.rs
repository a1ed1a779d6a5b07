use super::select::SelectedSet;

/// Non-empty labels needed before the content is split across two steps.
/// A coarse complexity heuristic; tune freely.
pub const MULTI_STEP_MIN_LABELS: usize = 3;

pub fn decide_step_count(selected: &SelectedSet) -> usize {
    if selected.non_empty_labels() >= MULTI_STEP_MIN_LABELS {
        2
    } else {
        1
    }
}
