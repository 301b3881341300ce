//! Line Diff (§4.6): a line-level LCS diff between two snapshots of document content.
//!
//! Hand-rolled rather than wrapping a character-level diff crate, because the spec fixes
//! the algorithm (line split, LCS DP matrix, backtrack, lockstep emission) and the summary
//! stats it produces (lines and code points per segment).

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffSegment {
    Added(Vec<String>),
    Removed(Vec<String>),
    Unchanged(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiffSummary {
    pub added_lines: usize,
    pub removed_lines: usize,
    pub added_chars: usize,
    pub removed_chars: usize,
    pub net_change: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineDiff {
    pub segments: Vec<DiffSegment>,
    pub summary: DiffSummary,
}

/// Splits on '\n', preserving trailing empty lines (so `"a\n"` yields `["a", ""]`), per
/// §4.6 step 1. A `None` input is treated as an empty string, which splits to `[""]`.
fn split_lines(text: Option<&str>) -> Vec<String> {
    text.unwrap_or("").split('\n').map(str::to_string).collect()
}

/// Computes the standard LCS length matrix over two line arrays (§4.6 step 2).
fn lcs_matrix(old: &[String], new: &[String]) -> Vec<Vec<usize>> {
    let (m, n) = (old.len(), new.len());
    let mut matrix = vec![vec![0usize; n + 1]; m + 1];
    for i in (0..m).rev() {
        for j in (0..n).rev() {
            matrix[i][j] = if old[i] == new[j] {
                matrix[i + 1][j + 1] + 1
            } else {
                matrix[i + 1][j].max(matrix[i][j + 1])
            };
        }
    }
    matrix
}

/// Backtracks the LCS matrix into a list of matched (old-index, new-index) pairs, in
/// increasing order (§4.6 step 3).
fn backtrack_matches(matrix: &[Vec<usize>], old: &[String], new: &[String]) -> Vec<(usize, usize)> {
    let mut matches = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    while i < old.len() && j < new.len() {
        if old[i] == new[j] {
            matches.push((i, j));
            i += 1;
            j += 1;
        } else if matrix[i + 1][j] >= matrix[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    matches
}

/// Computes the line-level diff between `old_text` and `new_text`. Either argument may be
/// `None`, treated as the empty string (§4.6 step 5). Always pre-computes `DiffSummary`; use
/// `line_diff_opts` to skip that pass when the caller doesn't want it (§6/§12 `diff.enabled`).
#[must_use]
pub fn line_diff(old_text: Option<&str>, new_text: Option<&str>) -> LineDiff {
    line_diff_opts(old_text, new_text, true)
}

/// Same as `line_diff`, but only accumulates `DiffSummary` counts when `compute_summary` is
/// true — the segments themselves (the diff proper) are always built regardless, since that
/// is `getDiff`'s whole purpose; `compute_summary = false` just skips the summary bookkeeping
/// `diff.enabled = false` asks for (§6/§12).
#[must_use]
pub fn line_diff_opts(old_text: Option<&str>, new_text: Option<&str>, compute_summary: bool) -> LineDiff {
    let old = split_lines(old_text);
    let new = split_lines(new_text);

    let matrix = lcs_matrix(&old, &new);
    let matches = backtrack_matches(&matrix, &old, &new);

    let mut segments = Vec::new();
    let mut summary = DiffSummary::default();
    let (mut old_cursor, mut new_cursor) = (0usize, 0usize);

    let mut flush_removed = |segments: &mut Vec<DiffSegment>, summary: &mut DiffSummary, end: usize, cursor: &mut usize| {
        if end > *cursor {
            let removed: Vec<String> = old[*cursor..end].to_vec();
            if compute_summary {
                summary.removed_lines += removed.len();
                summary.removed_chars += removed.iter().map(|l| l.chars().count()).sum::<usize>();
            }
            segments.push(DiffSegment::Removed(removed));
            *cursor = end;
        }
    };
    let mut flush_added = |segments: &mut Vec<DiffSegment>, summary: &mut DiffSummary, end: usize, cursor: &mut usize| {
        if end > *cursor {
            let added: Vec<String> = new[*cursor..end].to_vec();
            if compute_summary {
                summary.added_lines += added.len();
                summary.added_chars += added.iter().map(|l| l.chars().count()).sum::<usize>();
            }
            segments.push(DiffSegment::Added(added));
            *cursor = end;
        }
    };

    for (old_idx, new_idx) in &matches {
        flush_removed(&mut segments, &mut summary, *old_idx, &mut old_cursor);
        flush_added(&mut segments, &mut summary, *new_idx, &mut new_cursor);

        // Start (or extend) an Unchanged run of matched lines.
        if let Some(DiffSegment::Unchanged(lines)) = segments.last_mut() {
            lines.push(old[*old_idx].clone());
        } else {
            segments.push(DiffSegment::Unchanged(vec![old[*old_idx].clone()]));
        }
        old_cursor = old_idx + 1;
        new_cursor = new_idx + 1;
    }
    flush_removed(&mut segments, &mut summary, old.len(), &mut old_cursor);
    flush_added(&mut segments, &mut summary, new.len(), &mut new_cursor);

    if compute_summary {
        summary.net_change = summary.added_chars as i64 - summary.removed_chars as i64;
    }

    LineDiff { segments, summary }
}

/// Reassembles the text represented by a list of segments, keeping only the given variant
/// kinds. Used by the diff round-trip property in §8: `Added + Unchanged` reconstructs the
/// new text, `Removed + Unchanged` reconstructs the old text.
fn reassemble(segments: &[DiffSegment], keep_added: bool, keep_removed: bool) -> String {
    let mut lines = Vec::new();
    for segment in segments {
        match segment {
            DiffSegment::Added(ls) if keep_added => lines.extend(ls.iter().cloned()),
            DiffSegment::Removed(ls) if keep_removed => lines.extend(ls.iter().cloned()),
            DiffSegment::Unchanged(ls) => lines.extend(ls.iter().cloned()),
            _ => {}
        }
    }
    lines.join("\n")
}

#[must_use]
pub fn reassemble_new_text(segments: &[DiffSegment]) -> String {
    reassemble(segments, true, false)
}

#[must_use]
pub fn reassemble_old_text(segments: &[DiffSegment]) -> String {
    reassemble(segments, false, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_texts_are_fully_unchanged() {
        let diff = line_diff(Some("a\nb\nc"), Some("a\nb\nc"));
        assert_eq!(diff.segments, vec![DiffSegment::Unchanged(vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
        ])]);
        assert_eq!(diff.summary, DiffSummary::default());
    }

    #[test]
    fn pure_insertion_reports_added_lines() {
        let diff = line_diff(Some("a\nc"), Some("a\nb\nc"));
        assert_eq!(diff.summary.added_lines, 1);
        assert_eq!(diff.summary.removed_lines, 0);
        assert_eq!(diff.summary.added_chars, 1);
    }

    #[test]
    fn none_inputs_treated_as_empty_string() {
        let diff = line_diff(None, Some("hi"));
        assert_eq!(diff.summary.added_lines, 1);
        assert_eq!(diff.summary.added_chars, 2);
    }

    #[test]
    fn round_trip_reconstructs_both_texts() {
        let old = "one\ntwo\nthree";
        let new = "one\ntwo and a half\nthree\nfour";
        let diff = line_diff(Some(old), Some(new));

        assert_eq!(reassemble_new_text(&diff.segments), new);
        assert_eq!(reassemble_old_text(&diff.segments), old);
    }

    #[test]
    fn revert_round_trip_reports_removed_chars() {
        // Scenario 5: diff between version 1 ("Hi") and version 2 ("") reports 2 removed chars.
        let diff = line_diff(Some("Hi"), Some(""));
        assert_eq!(diff.summary.removed_chars, 2);
        assert_eq!(diff.summary.added_chars, 0);
    }
}
