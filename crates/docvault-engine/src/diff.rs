//! Line-oriented unified diff between two text payloads.
//!
//! The edit script comes from a longest-common-subsequence table over the
//! lines that remain once the common prefix and suffix are stripped. Output
//! follows the classic unified format: `---`/`+++` labels, `@@` hunk headers
//! and three lines of context.

use serde::Serialize;

/// Number of unchanged lines shown around each change.
const CONTEXT: usize = 3;

/// Above this many table cells the middle section is reported as a wholesale
/// replacement instead of being aligned line by line.
const MAX_LCS_CELLS: usize = 16 * 1024 * 1024;

/// Decode a payload as text. `None` marks it as binary.
pub fn decode_text(bytes: &[u8]) -> Option<&str> { std::str::from_utf8(bytes).ok() }

#[derive(Debug, Clone, Default, Serialize)]
pub struct LineDiff {
  /// Unified diff lines without trailing newlines; empty when the inputs are
  /// line-for-line identical.
  pub lines:   Vec<String>,
  pub added:   usize,
  pub removed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
  Equal,
  Delete,
  Insert,
}

/// One step of the edit script together with the line it refers to.
#[derive(Debug, Clone, Copy)]
struct Edit {
  op:      Op,
  /// Index into the old lines before this step.
  old_pos: usize,
  /// Index into the new lines before this step.
  new_pos: usize,
}

/// Diff `old` against `new` line by line.
pub fn unified(old: &str, new: &str, old_label: &str, new_label: &str) -> LineDiff {
  let a: Vec<&str> = old.lines().collect();
  let b: Vec<&str> = new.lines().collect();
  let script = edit_script(&a, &b);

  let added = script.iter().filter(|e| e.op == Op::Insert).count();
  let removed = script.iter().filter(|e| e.op == Op::Delete).count();
  if added == 0 && removed == 0 {
    return LineDiff::default();
  }

  let mut lines = vec![format!("--- {old_label}"), format!("+++ {new_label}")];
  for (lo, hi) in hunks(&script) {
    let hunk = &script[lo..hi];
    let old_len = hunk.iter().filter(|e| e.op != Op::Insert).count();
    let new_len = hunk.iter().filter(|e| e.op != Op::Delete).count();
    lines.push(format!(
      "@@ -{} +{} @@",
      format_range(hunk[0].old_pos, old_len),
      format_range(hunk[0].new_pos, new_len)
    ));
    for edit in hunk {
      lines.push(match edit.op {
        Op::Equal => format!(" {}", a[edit.old_pos]),
        Op::Delete => format!("-{}", a[edit.old_pos]),
        Op::Insert => format!("+{}", b[edit.new_pos]),
      });
    }
  }

  LineDiff { lines, added, removed }
}

/// Hunk header range: 1-based start, length omitted when it is one, and the
/// start moved back by one for an empty range.
fn format_range(start: usize, len: usize) -> String {
  match len {
    1 => format!("{}", start + 1),
    0 => format!("{start},0"),
    _ => format!("{},{len}", start + 1),
  }
}

/// Group the script into `[lo, hi)` ranges, each covering one or more
/// changes plus surrounding context. Changes separated by more than twice the
/// context are split into separate hunks.
fn hunks(script: &[Edit]) -> Vec<(usize, usize)> {
  let changes: Vec<usize> = script
    .iter()
    .enumerate()
    .filter(|(_, e)| e.op != Op::Equal)
    .map(|(i, _)| i)
    .collect();

  let mut out = Vec::new();
  let Some((&first, rest)) = changes.split_first() else {
    return out;
  };

  let mut start = first;
  let mut last = first;
  for &idx in rest {
    if idx - last - 1 > 2 * CONTEXT {
      out.push((start.saturating_sub(CONTEXT), (last + 1 + CONTEXT).min(script.len())));
      start = idx;
    }
    last = idx;
  }
  out.push((start.saturating_sub(CONTEXT), (last + 1 + CONTEXT).min(script.len())));
  out
}

fn edit_script(a: &[&str], b: &[&str]) -> Vec<Edit> {
  let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
  let suffix = a[prefix..]
    .iter()
    .rev()
    .zip(b[prefix..].iter().rev())
    .take_while(|(x, y)| x == y)
    .count();

  let mid_a = &a[prefix..a.len() - suffix];
  let mid_b = &b[prefix..b.len() - suffix];

  let mut ops = Vec::with_capacity(a.len() + b.len());
  ops.extend(std::iter::repeat_n(Op::Equal, prefix));
  ops.extend(align(mid_a, mid_b));
  ops.extend(std::iter::repeat_n(Op::Equal, suffix));

  group_deletes_first(&mut ops);

  let (mut old_pos, mut new_pos) = (0, 0);
  ops
    .into_iter()
    .map(|op| {
      let edit = Edit { op, old_pos, new_pos };
      match op {
        Op::Equal => {
          old_pos += 1;
          new_pos += 1;
        }
        Op::Delete => old_pos += 1,
        Op::Insert => new_pos += 1,
      }
      edit
    })
    .collect()
}

/// LCS alignment of two line slices with no common prefix or suffix.
fn align(a: &[&str], b: &[&str]) -> Vec<Op> {
  let (n, m) = (a.len(), b.len());
  let cells = (n + 1).saturating_mul(m + 1);
  if n == 0 || m == 0 || cells > MAX_LCS_CELLS {
    let mut ops = vec![Op::Delete; n];
    ops.extend(std::iter::repeat_n(Op::Insert, m));
    return ops;
  }

  // table[i * (m + 1) + j] = LCS length of a[i..] and b[j..]
  let width = m + 1;
  let mut table = vec![0u32; cells];
  for i in (0..n).rev() {
    for j in (0..m).rev() {
      table[i * width + j] = if a[i] == b[j] {
        table[(i + 1) * width + j + 1] + 1
      } else {
        table[(i + 1) * width + j].max(table[i * width + j + 1])
      };
    }
  }

  let mut ops = Vec::with_capacity(n + m);
  let (mut i, mut j) = (0, 0);
  while i < n && j < m {
    if a[i] == b[j] {
      ops.push(Op::Equal);
      i += 1;
      j += 1;
    } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
      ops.push(Op::Delete);
      i += 1;
    } else {
      ops.push(Op::Insert);
      j += 1;
    }
  }
  ops.extend(std::iter::repeat_n(Op::Delete, n - i));
  ops.extend(std::iter::repeat_n(Op::Insert, m - j));
  ops
}

/// Within every run of non-equal steps, list deletions before insertions.
fn group_deletes_first(ops: &mut [Op]) {
  for run in ops.split_mut(|op| *op == Op::Equal) {
    run.sort_by_key(|op| *op == Op::Insert);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn identical_text_has_no_diff() {
    let d = unified("a\nb\n", "a\nb\n", "v1", "v1");
    assert!(d.lines.is_empty());
    assert_eq!((d.added, d.removed), (0, 0));
  }

  #[test]
  fn single_line_change() {
    let d = unified("a\nb\nc\n", "a\nB\nc\n", "version 1", "version 2");
    assert_eq!(d.lines, vec![
      "--- version 1",
      "+++ version 2",
      "@@ -1,3 +1,3 @@",
      " a",
      "-b",
      "+B",
      " c",
    ]);
    assert_eq!((d.added, d.removed), (1, 1));
  }

  #[test]
  fn distant_changes_split_into_hunks() {
    let old: Vec<String> = (1..=20).map(|i| format!("l{i}")).collect();
    let mut new = old.clone();
    new[0] = "X".into();
    new[19] = "Y".into();

    let d = unified(&old.join("\n"), &new.join("\n"), "a", "b");
    let headers: Vec<&String> = d.lines.iter().filter(|l| l.starts_with("@@")).collect();
    assert_eq!(headers, vec!["@@ -1,4 +1,4 @@", "@@ -17,4 +17,4 @@"]);
    assert_eq!((d.added, d.removed), (2, 2));
  }

  #[test]
  fn insertion_into_empty_text() {
    let d = unified("", "hello\n", "a", "b");
    assert_eq!(d.lines, vec!["--- a", "+++ b", "@@ -0,0 +1 @@", "+hello"]);
    assert_eq!((d.added, d.removed), (1, 0));
  }

  #[test]
  fn interleaved_edits_keep_common_lines() {
    let d = unified("x\na\ny\nb\nz\n", "a\nq\nb\n", "a", "b");
    assert_eq!(d.removed, 3);
    assert_eq!(d.added, 1);
    assert!(d.lines.contains(&" a".to_string()));
    assert!(d.lines.contains(&" b".to_string()));
  }

  #[test]
  fn invalid_utf8_is_binary() {
    assert!(decode_text(&[0xff, 0xfe, 0x00]).is_none());
    assert_eq!(decode_text(b"plain"), Some("plain"));
  }
}
