//! Block-of-four arpeggio.
//!
//! Notes are grouped into fixed blocks of four by their absolute position in
//! the unsliced pattern, so a loop window or offset never changes which notes
//! an arpeggio steps through.

use pipit_types::Note;

use crate::device::{AudioDevice, Automation, DeviceResult, VoiceId, VoiceParam};

pub const BLOCK_SIZE: usize = 4;

/// Upper bound on strokes per arpeggio. Larger values are clamped.
pub const MAX_STROKES: usize = 256;

/// Absolute positions of the four block members for the note at `index`.
///
/// Positions past the end of the pattern rewind to an earlier member of the
/// same block instead of reading out of bounds.
pub fn block_members(len: usize, index: usize) -> [usize; BLOCK_SIZE] {
    let base = (index / BLOCK_SIZE) * BLOCK_SIZE;
    let mut members = [base; BLOCK_SIZE];
    let mut last_valid = 0;
    for (i, member) in members.iter_mut().enumerate() {
        let p = base + i;
        if p < len {
            *member = p;
            last_valid = i;
        } else if last_valid > 0 {
            *member = base + index % last_valid;
        }
    }
    members
}

/// Stroke count for a descriptor value: at least one full pass over the
/// block, rounded up to whole blocks so the last stroke lands on the fourth
/// member. Never exceeds [`MAX_STROKES`].
pub fn stroke_count(value: f64) -> usize {
    let strokes = if value.is_nan() {
        1
    } else {
        value.round().clamp(1.0, MAX_STROKES as f64) as usize
    };
    strokes.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

/// Schedule evenly spaced frequency sets over `[begin, end]`.
pub fn schedule_arpeggio(
    device: &dyn AudioDevice,
    voice: VoiceId,
    notes: &[Note],
    index: usize,
    value: f64,
    begin: f64,
    end: f64,
) -> DeviceResult {
    if notes.is_empty() {
        return Ok(());
    }
    let index = index.min(notes.len() - 1);
    let members = block_members(notes.len(), index);
    let strokes = stroke_count(value);
    let span = (end - begin).max(0.0);
    let step = span / (strokes - 1) as f64;

    log::trace!(
        target: "pipit::effects",
        "arpeggio at {} over {:?}: {} strokes in {:.4}s",
        index, members, strokes, span
    );

    for k in 0..strokes {
        let member = members[k % BLOCK_SIZE];
        device.automate(
            voice,
            VoiceParam::Frequency,
            Automation::SetValue {
                value: notes[member].frequency,
                time: begin + step * k as f64,
            },
        )?;
    }
    Ok(())
}
