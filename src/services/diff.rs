//! 字符级差异计算

use similar::{ChangeTag, TextDiff};

/// 差异片段类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    Equal,
    Added,
    Removed,
}

/// 连续的同类字符
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffSegment {
    pub kind: DiffKind,
    pub text: String,
}

/// 计算原始说明与改写结果之间的字符级差异，相邻同类变化合并为一段
pub fn diff_chars(original: &str, rewritten: &str) -> Vec<DiffSegment> {
    let diff = TextDiff::from_chars(original, rewritten);
    let mut segments: Vec<DiffSegment> = Vec::new();

    for change in diff.iter_all_changes() {
        let kind = match change.tag() {
            ChangeTag::Equal => DiffKind::Equal,
            ChangeTag::Insert => DiffKind::Added,
            ChangeTag::Delete => DiffKind::Removed,
        };
        match segments.last_mut() {
            Some(last) if last.kind == kind => last.text.push_str(change.value()),
            _ => segments.push(DiffSegment {
                kind,
                text: change.value().to_string(),
            }),
        }
    }

    segments
}

/// 渲染为行内标记：`[-删除-]{+新增+}`
pub fn render_inline(segments: &[DiffSegment]) -> String {
    segments
        .iter()
        .map(|s| match s.kind {
            DiffKind::Equal => s.text.clone(),
            DiffKind::Added => format!("{{+{}+}}", s.text),
            DiffKind::Removed => format!("[-{}-]", s.text),
        })
        .collect()
}

/// 只保留某一侧可见的片段
///
/// 原始一侧去掉新增，改写一侧去掉删除
pub fn side(segments: &[DiffSegment], keep: DiffKind) -> Vec<&DiffSegment> {
    segments
        .iter()
        .filter(|s| s.kind == DiffKind::Equal || s.kind == keep)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn concat(segments: &[&DiffSegment]) -> String {
        segments.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn test_empty_original_is_all_added() {
        let segments = diff_chars("", "全新的说明");
        assert_eq!(
            segments,
            vec![DiffSegment {
                kind: DiffKind::Added,
                text: "全新的说明".to_string()
            }]
        );
        assert!(segments.iter().all(|s| s.kind != DiffKind::Removed));
    }

    #[test]
    fn test_identical_is_single_equal() {
        let segments = diff_chars("same", "same");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].kind, DiffKind::Equal);
    }

    #[test]
    fn test_sides_reconstruct_both_texts() {
        let original = "a black cat sits";
        let rewritten = "a small black cat sat";
        let segments = diff_chars(original, rewritten);

        assert_eq!(concat(&side(&segments, DiffKind::Removed)), original);
        assert_eq!(concat(&side(&segments, DiffKind::Added)), rewritten);
    }

    #[test]
    fn test_render_inline() {
        let segments = vec![
            DiffSegment {
                kind: DiffKind::Equal,
                text: "猫".to_string(),
            },
            DiffSegment {
                kind: DiffKind::Removed,
                text: "睡".to_string(),
            },
            DiffSegment {
                kind: DiffKind::Added,
                text: "躺".to_string(),
            },
        ];
        assert_eq!(render_inline(&segments), "猫[-睡-]{+躺+}");
    }
}
