// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::errors::{FarmError, FarmResult};
use crate::app::types::FrameTask;

/// Validated `start-end×step` range expression, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRange {
    pub start: i64,
    pub end: i64,
    pub step: i64,
}

impl FrameRange {
    /// Parse UI-collected frame fields. Non-numeric input fails validation
    /// and must be re-collected, never converted to a zero default.
    pub fn parse(start: &str, end: &str, step: &str) -> FarmResult<Self> {
        let start = parse_frame_field("frame start", start)?;
        let end = parse_frame_field("frame end", end)?;
        let step = parse_frame_field("frame step", step)?;
        if step < 1 {
            return Err(FarmError::Validation(format!(
                "frame step must be at least 1, got {step}"
            )));
        }
        Ok(Self { start, end, step })
    }

    pub fn frames(&self) -> Vec<i64> {
        let mut out = Vec::new();
        let mut frame = self.start;
        while frame <= self.end {
            out.push(frame);
            frame += self.step;
        }
        out
    }

    /// Minimum digit count for frame-number tokens in output filenames:
    /// one more than the widest frame number the range can produce.
    pub fn padding_width(&self) -> usize {
        let widest = (self.end * self.step).abs();
        digits(widest) + 1
    }
}

fn parse_frame_field(label: &str, raw: &str) -> FarmResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| FarmError::Validation(format!("{label} is not a number: {raw:?}")))
}

fn digits(mut value: i64) -> usize {
    let mut count = 1;
    while value >= 10 {
        value /= 10;
        count += 1;
    }
    count
}

/// Expand a range into the ordered agenda submitted with the job.
pub fn agenda(range: FrameRange, width: usize) -> Vec<FrameTask> {
    range
        .frames()
        .into_iter()
        .map(|frame| FrameTask {
            frame,
            name: format!("frame {frame:0width$}"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepped_range_is_inclusive_and_sparse() {
        let range = FrameRange::parse("1", "10", "2").unwrap();
        assert_eq!(range.frames(), vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn single_frame_when_start_equals_end() {
        let range = FrameRange::parse("5", "5", "1").unwrap();
        assert_eq!(range.frames(), vec![5]);
    }

    #[test]
    fn non_numeric_fields_fail_validation() {
        let err = FrameRange::parse("one", "10", "1").unwrap_err();
        assert!(err.to_string().contains("frame start"));
        assert!(FrameRange::parse("1", "10", "0").is_err());
    }

    #[test]
    fn padding_width_is_one_more_than_last_frame() {
        let range = FrameRange::parse("1", "120", "1").unwrap();
        assert_eq!(range.padding_width(), 4);
        let range = FrameRange::parse("1", "9", "1").unwrap();
        assert_eq!(range.padding_width(), 2);
    }

    #[test]
    fn agenda_names_use_the_padding_width() {
        let range = FrameRange::parse("1", "120", "1").unwrap();
        let agenda = agenda(range, range.padding_width());
        assert_eq!(agenda.len(), 120);
        assert_eq!(agenda[0].name, "frame 0001");
        assert_eq!(agenda[119].frame, 120);
    }
}
