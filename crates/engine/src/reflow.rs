//! Overlap resolution for one track.
//!
//! Greedy forward compaction: clips are ordered by start time and any clip
//! that starts before its predecessor ends is pushed to that end. Gaps are
//! kept; nothing is ever pulled left.

use tracing::debug;

use crate::clip::{Clip, ClipId};

/// Start times closer than this count as a tie.
pub const TIE_EPSILON: f64 = 0.01;
/// Overlaps up to this size are treated as arithmetic noise.
pub const OVERLAP_TOLERANCE: f64 = 0.001;

/// Reorders and repositions `clips` so that no two of them overlap.
///
/// `active` is the most recently manipulated clip. It sorts before every
/// clip whose start lies within [`TIE_EPSILON`] of its own start, so it keeps
/// its position and the neighbours move instead.
///
/// # Example
/// ```
/// use engine::clip::create_text_clip;
/// use engine::reflow::resolve_overlaps;
///
/// let first = create_text_clip(0.0);
/// let second = create_text_clip(1.0);
/// let resolved = resolve_overlaps(vec![second, first], None);
///
/// assert_eq!(resolved[0].start_offset, 0.0);
/// assert_eq!(resolved[1].start_offset, 3.0);
/// ```
pub fn resolve_overlaps(mut clips: Vec<Clip>, active: Option<ClipId>) -> Vec<Clip> {
    clips.sort_by(|a, b| a.start_offset.total_cmp(&b.start_offset));

    if let Some(mut index) = active.and_then(|id| clips.iter().position(|clip| clip.id == id)) {
        let anchor = clips[index].start_offset;
        while index > 0 && (anchor - clips[index - 1].start_offset).abs() < TIE_EPSILON {
            clips.swap(index - 1, index);
            index -= 1;
        }
    }

    for index in 1..clips.len() {
        let previous_end = clips[index - 1].end();
        let clip = &mut clips[index];
        if clip.start_offset < previous_end - OVERLAP_TOLERANCE {
            debug!(
                clip_id = %clip.id,
                from = clip.start_offset,
                to = previous_end,
                "clip pushed by overlap"
            );
            clip.start_offset = previous_end;
        }
    }

    clips
}

/// Returns true when no two clips in `clips` overlap by more than the
/// tolerance.
pub fn is_overlap_free(clips: &[Clip]) -> bool {
    let mut intervals = clips
        .iter()
        .map(|clip| (clip.start_offset, clip.end()))
        .collect::<Vec<_>>();
    intervals.sort_by(|a, b| a.0.total_cmp(&b.0));
    intervals
        .windows(2)
        .all(|pair| pair[1].0 >= pair[0].1 - OVERLAP_TOLERANCE)
}

#[cfg(test)]
mod tests {
    use super::{is_overlap_free, resolve_overlaps};
    use crate::clip::{Clip, create_text_clip};

    fn clip(start: f64, duration: f64) -> Clip {
        let mut clip = create_text_clip(start);
        clip.duration = duration;
        clip
    }

    fn starts(clips: &[Clip]) -> Vec<f64> {
        clips.iter().map(|clip| clip.start_offset).collect()
    }

    #[test]
    fn overlapping_clips_are_pushed_forward_and_gaps_preserved() {
        let clips = vec![clip(0.0, 4.0), clip(2.0, 3.0), clip(20.0, 1.0)];

        let resolved = resolve_overlaps(clips, None);

        assert_eq!(starts(&resolved), vec![0.0, 4.0, 20.0]);
        assert!(is_overlap_free(&resolved));
    }

    #[test]
    fn pushes_cascade_through_the_whole_track() {
        let clips = vec![clip(0.0, 5.0), clip(1.0, 5.0), clip(6.0, 5.0), clip(30.0, 2.0)];

        let resolved = resolve_overlaps(clips, None);

        assert_eq!(starts(&resolved), vec![0.0, 5.0, 10.0, 30.0]);
    }

    #[test]
    fn later_clips_are_never_pulled_left() {
        let clips = vec![clip(0.0, 1.0), clip(5.0, 1.0)];

        let resolved = resolve_overlaps(clips, None);

        assert_eq!(starts(&resolved), vec![0.0, 5.0]);
    }

    #[test]
    fn sub_tolerance_overlap_is_left_alone() {
        let clips = vec![clip(0.0, 2.0), clip(1.9995, 1.0)];

        let resolved = resolve_overlaps(clips, None);

        assert_eq!(starts(&resolved), vec![0.0, 1.9995]);
    }

    #[test]
    fn active_clip_wins_a_near_tie() {
        let resting = clip(4.0, 2.0);
        let moved = clip(4.005, 3.0);
        let moved_id = moved.id;

        let resolved = resolve_overlaps(vec![resting, moved], Some(moved_id));

        assert_eq!(resolved[0].id, moved_id);
        assert_eq!(resolved[0].start_offset, 4.005);
        assert_eq!(resolved[1].start_offset, resolved[0].end());
    }

    #[test]
    fn active_clip_outside_tie_window_keeps_start_order() {
        let resting = clip(4.0, 2.0);
        let moved = clip(4.5, 3.0);
        let resting_id = resting.id;
        let moved_id = moved.id;

        let resolved = resolve_overlaps(vec![moved, resting], Some(moved_id));

        assert_eq!(resolved[0].id, resting_id);
        assert_eq!(resolved[1].start_offset, 6.0);
    }

    #[test]
    fn active_clip_moves_ahead_of_every_clip_it_ties_with() {
        let a = clip(1.0, 1.0);
        let b = clip(1.004, 1.0);
        let active = clip(1.008, 1.0);
        let active_id = active.id;

        let resolved = resolve_overlaps(vec![a, b, active], Some(active_id));

        assert_eq!(resolved[0].id, active_id);
        assert_eq!(resolved[0].start_offset, 1.008);
        assert_eq!(resolved[1].start_offset, resolved[0].end());
        assert_eq!(resolved[2].start_offset, resolved[1].end());
    }

    #[test]
    fn reflow_is_idempotent() {
        let cases = vec![
            vec![clip(0.0, 4.0), clip(2.0, 3.0), clip(3.0, 3.0), clip(20.0, 1.0)],
            vec![clip(5.0, 1.0), clip(5.0, 1.0), clip(5.0, 1.0)],
            vec![clip(0.0, 0.3), clip(0.2, 0.3), clip(10.0, 0.5), clip(10.1, 0.2)],
        ];

        for clips in cases {
            let active = clips.last().map(|clip| clip.id);
            let once = resolve_overlaps(clips, active);
            let twice = resolve_overlaps(once.clone(), active);
            assert_eq!(once, twice);
            assert!(is_overlap_free(&once));
        }
    }

    #[test]
    fn empty_and_single_tracks_pass_through() {
        assert!(resolve_overlaps(Vec::new(), None).is_empty());

        let single = clip(2.0, 1.0);
        let resolved = resolve_overlaps(vec![single.clone()], Some(single.id));
        assert_eq!(resolved, vec![single]);
    }
}
