//! Unified diff rendering of reference output against test output.
//!
//! Lines shared at both ends are matched directly; the line-level edit script
//! for the middle comes from [`difference::Changeset`]. The result is grouped
//! into hunks with three lines of context, the way `diff -u` does.

use difference::{Changeset, Difference};

/// Label of the expected side in the diff header.
pub const REFERENCE_LABEL: &str = "reference output";
/// Label of the actual side in the diff header.
pub const ACTUAL_LABEL: &str = "test output";

/// Unchanged lines shown around each change.
const CONTEXT: usize = 3;

/// Largest `old * new` line product handed to `Changeset`, whose LCS table
/// grows with that product. Bigger middles are rendered as a block replace.
const MAX_LCS_CELLS: usize = 1_000_000;

/// Prefixed to every line before diffing so an empty line is told apart from
/// an empty side.
const SENTINEL: char = '\u{1}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Equal,
    Delete,
    Insert,
}

#[derive(Debug)]
struct Line {
    tag: Tag,
    text: String,
}

impl Line {
    fn new(tag: Tag, text: &str) -> Self {
        Self {
            tag,
            text: text.to_string(),
        }
    }
}

/// Render a unified diff of `reference` against `actual`.
///
/// Returns an empty string when both sides are identical. Lines are joined
/// with `\n` and the result has no trailing newline. If the two strings differ
/// only in line terminators, the diff consists of the header and a single
/// `\` note, since no line-level change exists to show.
pub fn unified_diff(reference: &str, actual: &str) -> String {
    if reference == actual {
        return String::new();
    }

    let lines = edit_script(reference, actual);

    let mut out = vec![
        format!("--- {REFERENCE_LABEL}"),
        format!("+++ {ACTUAL_LABEL}"),
    ];

    let changes: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.tag != Tag::Equal)
        .map(|(i, _)| i)
        .collect();

    if changes.is_empty() {
        out.push("\\ outputs differ only in line endings".to_string());
        return out.join("\n");
    }

    for (first, last) in group_changes(&changes) {
        let lo = first.saturating_sub(CONTEXT);
        let hi = (last + 1 + CONTEXT).min(lines.len());
        out.push(hunk_header(&lines, lo, hi));
        for line in &lines[lo..hi] {
            let marker = match line.tag {
                Tag::Equal => ' ',
                Tag::Delete => '-',
                Tag::Insert => '+',
            };
            out.push(format!("{marker}{}", line.text));
        }
    }

    out.join("\n")
}

/// Line-level edit script turning `reference` into `actual`.
fn edit_script(reference: &str, actual: &str) -> Vec<Line> {
    let old: Vec<&str> = reference.lines().collect();
    let new: Vec<&str> = actual.lines().collect();

    let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut lines: Vec<Line> = old[..prefix].iter().map(|l| Line::new(Tag::Equal, l)).collect();

    if old_mid.is_empty() || new_mid.is_empty() || old_mid.len() * new_mid.len() > MAX_LCS_CELLS {
        if !old_mid.is_empty() && !new_mid.is_empty() {
            tracing::debug!(
                reference_lines = old_mid.len(),
                actual_lines = new_mid.len(),
                "changed block too large for a line diff; rendering as a replace"
            );
        }
        lines.extend(old_mid.iter().map(|l| Line::new(Tag::Delete, l)));
        lines.extend(new_mid.iter().map(|l| Line::new(Tag::Insert, l)));
    } else {
        let changeset = Changeset::new(&encode(old_mid), &encode(new_mid), "\n");
        expand(&changeset.diffs, &mut lines);
    }

    lines.extend(old[old.len() - suffix..].iter().map(|l| Line::new(Tag::Equal, l)));
    lines
}

fn encode(lines: &[&str]) -> String {
    lines
        .iter()
        .map(|line| format!("{SENTINEL}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn expand(diffs: &[Difference], lines: &mut Vec<Line>) {
    for diff in diffs {
        let (tag, chunk) = match diff {
            Difference::Same(chunk) => (Tag::Equal, chunk),
            Difference::Rem(chunk) => (Tag::Delete, chunk),
            Difference::Add(chunk) => (Tag::Insert, chunk),
        };
        // An empty side splits into one unprefixed "" that is not a line.
        lines.extend(
            chunk
                .split('\n')
                .filter_map(|raw| raw.strip_prefix(SENTINEL))
                .map(|text| Line::new(tag, text)),
        );
    }
}

/// Group change positions into hunks; runs of more than `2 * CONTEXT`
/// unchanged lines separate hunks.
fn group_changes(changes: &[usize]) -> Vec<(usize, usize)> {
    let mut groups: Vec<(usize, usize)> = Vec::new();
    for &idx in changes {
        match groups.last_mut() {
            Some((_, last)) if idx - *last - 1 <= 2 * CONTEXT => *last = idx,
            _ => groups.push((idx, idx)),
        }
    }
    groups
}

fn hunk_header(lines: &[Line], lo: usize, hi: usize) -> String {
    let old_before = lines[..lo].iter().filter(|l| l.tag != Tag::Insert).count();
    let new_before = lines[..lo].iter().filter(|l| l.tag != Tag::Delete).count();
    let old_len = lines[lo..hi].iter().filter(|l| l.tag != Tag::Insert).count();
    let new_len = lines[lo..hi].iter().filter(|l| l.tag != Tag::Delete).count();
    format!(
        "@@ -{} +{} @@",
        format_range(old_before, old_len),
        format_range(new_before, new_len)
    )
}

/// Format a hunk range: `start,len`, just `start` when `len == 1`.
fn format_range(start: usize, len: usize) -> String {
    match len {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        _ => format!("{},{len}", start + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lines `1..=n`, with the given line numbers replaced.
    fn numbered(n: usize, replace: &[(usize, &str)]) -> String {
        (1..=n)
            .map(|i| match replace.iter().find(|(at, _)| *at == i) {
                Some((_, text)) => format!("{text}\n"),
                None => format!("{i}\n"),
            })
            .collect()
    }

    #[test]
    fn test_identical_is_empty() {
        assert_eq!(unified_diff("a\nb\n", "a\nb\n"), "");
        assert_eq!(unified_diff("", ""), "");
    }

    #[test]
    fn test_single_line_replacement() {
        assert_eq!(
            unified_diff("bye\n", "hi\n"),
            "--- reference output\n+++ test output\n@@ -1 +1 @@\n-bye\n+hi"
        );
    }

    #[test]
    fn test_context_lines_are_space_prefixed() {
        let diff = unified_diff("a\nb\nc\n", "a\nX\nc\n");
        assert_eq!(
            diff,
            "--- reference output\n+++ test output\n@@ -1,3 +1,3 @@\n a\n-b\n+X\n c"
        );
    }

    #[test]
    fn test_added_lines_against_empty_reference() {
        assert_eq!(
            unified_diff("", "hi\nthere\n"),
            "--- reference output\n+++ test output\n@@ -0,0 +1,2 @@\n+hi\n+there"
        );
    }

    #[test]
    fn test_removed_lines_against_empty_output() {
        assert_eq!(
            unified_diff("gone\n", ""),
            "--- reference output\n+++ test output\n@@ -1 +0,0 @@\n-gone"
        );
    }

    #[test]
    fn test_blank_lines_are_real_lines() {
        let diff = unified_diff("a\n\nb\n", "a\nb\n");
        assert_eq!(
            diff,
            "--- reference output\n+++ test output\n@@ -1,3 +1,2 @@\n a\n-\n b"
        );
    }

    #[test]
    fn test_distant_changes_make_separate_hunks() {
        let reference = numbered(20, &[]);
        let actual = numbered(20, &[(2, "two"), (19, "nineteen")]);
        let diff = unified_diff(&reference, &actual);
        let hunks: Vec<&str> = diff.lines().filter(|l| l.starts_with("@@")).collect();
        assert_eq!(hunks, vec!["@@ -1,5 +1,5 @@", "@@ -16,5 +16,5 @@"]);
    }

    #[test]
    fn test_nearby_changes_share_a_hunk() {
        let reference = numbered(12, &[]);
        let actual = numbered(12, &[(2, "two"), (9, "nine")]);
        let diff = unified_diff(&reference, &actual);
        let hunks: Vec<&str> = diff.lines().filter(|l| l.starts_with("@@")).collect();
        assert_eq!(hunks, vec!["@@ -1,12 +1,12 @@"]);
    }

    #[test]
    fn test_trailing_newline_only() {
        let diff = unified_diff("hi\n", "hi");
        assert_eq!(
            diff,
            "--- reference output\n+++ test output\n\\ outputs differ only in line endings"
        );
    }

    #[test]
    fn test_no_trailing_newline_in_output() {
        assert!(!unified_diff("a\n", "b\n").ends_with('\n'));
    }

    #[test]
    fn test_large_unrelated_outputs_render_as_one_replace() {
        let reference: String = (0..20_000).map(|i| format!("expected {i}\n")).collect();
        let actual: String = (0..20_000).map(|i| format!("got {i}\n")).collect();

        let start = std::time::Instant::now();
        let diff = unified_diff(&reference, &actual);
        assert!(start.elapsed() < std::time::Duration::from_secs(5));

        let hunks: Vec<&str> = diff.lines().filter(|l| l.starts_with("@@")).collect();
        assert_eq!(hunks, vec!["@@ -1,20000 +1,20000 @@"]);
        let body: Vec<&str> = diff.lines().skip(3).collect();
        assert_eq!(body.len(), 40_000);
        assert_eq!(body[0], "-expected 0");
        assert_eq!(body[19_999], "-expected 19999");
        assert_eq!(body[20_000], "+got 0");
    }

    #[test]
    fn test_change_inside_long_shared_output() {
        let reference = numbered(50_000, &[]);
        let actual = numbered(50_000, &[(25_000, "changed")]);
        let diff = unified_diff(&reference, &actual);
        let lines: Vec<&str> = diff.lines().collect();
        assert_eq!(lines[2], "@@ -24997,7 +24997,7 @@");
        assert_eq!(lines[6], "-25000");
        assert_eq!(lines[7], "+changed");
        assert_eq!(lines.len(), 11);
    }

    #[test]
    fn test_format_range() {
        assert_eq!(format_range(0, 0), "0,0");
        assert_eq!(format_range(4, 0), "4,0");
        assert_eq!(format_range(0, 1), "1");
        assert_eq!(format_range(2, 3), "3,3");
    }
}
