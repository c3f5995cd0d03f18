//! Offset/length slicing and loop-window splitting.
//!
//! All ranges are absolute indices into the unsliced pattern, so every part
//! keeps its position for arpeggio block membership.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlicePlan {
    /// Played once, first
    pub prelude: Range<usize>,
    /// Repeats after the prelude
    pub looped: Option<Range<usize>>,
}

/// Split a pattern of `len` notes.
///
/// `offset` trims the head and shifts the loop window by `-offset`;
/// `length` truncates the tail. The shifted window `[a, b)` must satisfy
/// `0 <= a < b <= remaining`; otherwise the slice plays once as a whole.
pub fn plan_slice(
    len: usize,
    offset: Option<usize>,
    length: Option<usize>,
    window: Option<[i64; 2]>,
) -> SlicePlan {
    let start = offset.unwrap_or(0).min(len);
    let end = length.map_or(len, |l| start.saturating_add(l).min(len));
    let remaining = (end - start) as i64;

    let shift = start as i64;
    let shifted = window.and_then(|[a, b]| Some([a.checked_sub(shift)?, b.checked_sub(shift)?]));
    match shifted {
        Some([a, b]) if 0 <= a && b > 0 && a <= remaining && b <= remaining && a < b => {
            let a = start + a as usize;
            let b = start + b as usize;
            SlicePlan {
                prelude: start..a,
                looped: Some(a..b),
            }
        }
        _ => SlicePlan {
            prelude: start..end,
            looped: None,
        },
    }
}
