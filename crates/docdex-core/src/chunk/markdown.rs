//! Markdown chunking strategy
//!
//! Flattens the ATX heading tree (levels 1-5) into leaf sections,
//! each prefixed by its `parent > … > leaf` breadcrumb, then runs the
//! token limiter and small-chunk merge. Short files whose code is
//! inline stay whole; headingless files fall back to paragraphs.

use super::{
    approx_tokens, split_by_tokens, ChunkDraft, ChunkType, LinePart, Overlap, DOC_MAX_TOKENS,
    DOC_MERGE_UNDER_TOKENS, DOC_MIN_TOKENS, DOC_OVERLAP_TOKENS,
};

#[derive(Debug, Clone)]
struct Heading {
    level: usize,
    title: String,
    /// 0-indexed line of the heading itself
    line: usize,
}

#[derive(Debug)]
struct LeafSection {
    breadcrumb: String,
    /// 0-indexed start line (includes the heading)
    start: usize,
    /// 0-indexed exclusive end line
    end: usize,
}

/// Chunk a markdown document
pub fn chunk_markdown(content: &str, title: &str) -> Vec<ChunkDraft> {
    let lines: Vec<&str> = content.lines().collect();
    let headings = parse_headings(&lines);

    if is_inline_doc(content, &headings) {
        let draft = ChunkDraft {
            chunk_type: ChunkType::DocInline,
            content: format!("{}\n\n{}", title, content.trim_end()),
            context_path: Some(title.to_string()),
            language: None,
            symbol: None,
            line_start: Some(1),
            line_end: Some(lines.len().max(1)),
            char_start: Some(0),
            char_end: Some(content.len()),
            token_count: approx_tokens(content),
        };
        return vec![draft];
    }

    let sections = if headings.is_empty() {
        vec![LeafSection {
            breadcrumb: title.to_string(),
            start: 0,
            end: lines.len(),
        }]
    } else {
        leaf_sections(&headings, lines.len(), title)
    };

    let mut drafts = Vec::new();
    for section in sections {
        let body = lines[section.start..section.end].join("\n");
        if body.trim().is_empty() {
            continue;
        }
        for part in split_by_tokens(
            &body,
            section.start + 1,
            DOC_MAX_TOKENS,
            Overlap::Tokens(DOC_OVERLAP_TOKENS),
            DOC_MIN_TOKENS,
        ) {
            drafts.push(part_to_draft(part, &section.breadcrumb));
        }
    }

    merge_small_chunks(drafts)
}

/// Whether markdown content contains a code block (fenced or
/// 4-space indented)
pub fn has_code_snippet(content: &str) -> bool {
    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            return true;
        }
        if line.starts_with("    ") && !line.trim().is_empty() {
            return true;
        }
    }
    false
}

fn parse_headings(lines: &[&str]) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut in_fence = false;
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(heading) = parse_atx(line, i) {
            headings.push(heading);
        }
    }
    headings
}

fn parse_atx(line: &str, line_no: usize) -> Option<Heading> {
    if !line.starts_with('#') {
        return None;
    }
    let level = line.chars().take_while(|&c| c == '#').count();
    if level == 0 || level > 5 {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with(' ') && !rest.is_empty() {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim().to_string();
    if title.is_empty() {
        return None;
    }
    Some(Heading {
        level,
        title,
        line: line_no,
    })
}

/// Short, flat, and code-bearing documents stay whole
fn is_inline_doc(content: &str, headings: &[Heading]) -> bool {
    if approx_tokens(content) > DOC_MAX_TOKENS {
        return false;
    }
    let min_level = headings.iter().map(|h| h.level).min();
    let nested = min_level
        .map(|min| headings.iter().any(|h| h.level > min))
        .unwrap_or(false);
    !nested && has_code_snippet(content)
}

fn leaf_sections(headings: &[Heading], total_lines: usize, title: &str) -> Vec<LeafSection> {
    let mut sections = Vec::new();

    // Preamble ahead of the first heading belongs to the document root
    if headings[0].line > 0 {
        sections.push(LeafSection {
            breadcrumb: title.to_string(),
            start: 0,
            end: headings[0].line,
        });
    }

    let mut stack: Vec<&Heading> = Vec::new();
    for (i, heading) in headings.iter().enumerate() {
        while let Some(top) = stack.last() {
            if top.level >= heading.level {
                stack.pop();
            } else {
                break;
            }
        }

        let next = headings.get(i + 1);
        let is_leaf = next.map(|n| n.level <= heading.level).unwrap_or(true);
        if is_leaf {
            let mut parts: Vec<&str> = stack.iter().map(|h| h.title.as_str()).collect();
            parts.push(&heading.title);
            sections.push(LeafSection {
                breadcrumb: parts.join(" > "),
                start: heading.line,
                end: next.map(|n| n.line).unwrap_or(total_lines),
            });
        }
        stack.push(heading);
    }

    sections
}

fn part_to_draft(part: LinePart, breadcrumb: &str) -> ChunkDraft {
    let content = format!("{}\n\n{}", breadcrumb, part.text.trim_end());
    let token_count = approx_tokens(&content);
    ChunkDraft {
        chunk_type: ChunkType::Doc,
        content,
        context_path: Some(breadcrumb.to_string()),
        language: None,
        symbol: None,
        line_start: Some(part.start_line),
        line_end: Some(part.end_line),
        char_start: None,
        char_end: None,
        token_count,
    }
}

fn merge_small_chunks(drafts: Vec<ChunkDraft>) -> Vec<ChunkDraft> {
    let mut out: Vec<ChunkDraft> = Vec::with_capacity(drafts.len());
    for draft in drafts {
        if let Some(last) = out.last_mut() {
            if last.token_count < DOC_MERGE_UNDER_TOKENS
                && last.token_count + draft.token_count < DOC_MAX_TOKENS
            {
                last.content.push_str("\n\n");
                last.content.push_str(&draft.content);
                last.token_count = approx_tokens(&last.content);
                last.line_end = draft.line_end.or(last.line_end);
                continue;
            }
        }
        out.push(draft);
    }
    out
}
