//! Line-oriented splitting shared by both chunking strategies

use super::approx_tokens;

/// How parts overlap at their seam
#[derive(Debug, Clone, Copy)]
pub(crate) enum Overlap {
    /// Repeat trailing lines until roughly this many tokens
    Tokens(usize),
    /// Repeat exactly this many trailing lines
    Lines(usize),
}

/// One split part with 1-indexed inclusive line range
#[derive(Debug, Clone)]
pub(crate) struct LinePart {
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
}

/// Split text line-by-line so each part stays at or under
/// `max_tokens`. Parts after the first repeat overlap lines from the
/// previous part. A final part under `min_tokens` folds back into its
/// predecessor when the result still fits.
pub(crate) fn split_by_tokens(
    text: &str,
    first_line: usize,
    max_tokens: usize,
    overlap: Overlap,
    min_tokens: usize,
) -> Vec<LinePart> {
    if approx_tokens(text) <= max_tokens {
        let line_count = text.lines().count().max(1);
        return vec![LinePart {
            start_line: first_line,
            end_line: first_line + line_count - 1,
            text: text.to_string(),
        }];
    }

    // A single line can exceed the budget on its own (minified
    // sources); pre-cut such lines into character windows that keep
    // their original line number.
    let lines: Vec<(usize, String)> = text
        .lines()
        .enumerate()
        .flat_map(|(i, line)| {
            let line_no = first_line + i;
            cut_long_line(line, max_tokens)
                .into_iter()
                .map(move |piece| (line_no, piece))
        })
        .collect();

    let token_of = |s: &str| approx_tokens(s);
    let mut parts: Vec<Vec<(usize, String)>> = Vec::new();
    let mut current: Vec<(usize, String)> = Vec::new();
    let mut current_tokens = 0usize;

    for (line_no, line) in lines {
        let line_tokens = token_of(&line);
        if !current.is_empty() && current_tokens + line_tokens > max_tokens {
            let carried = overlap_tail(&current, overlap);
            parts.push(std::mem::take(&mut current));
            current_tokens = 0;
            for item in carried {
                current_tokens += token_of(&item.1);
                current.push(item);
            }
        }
        current_tokens += line_tokens;
        current.push((line_no, line));
    }
    if !current.is_empty() {
        parts.push(current);
    }

    // Fold a tiny tail into its predecessor when that stays legal
    if parts.len() > 1 {
        let tail_tokens: usize = parts[parts.len() - 1]
            .iter()
            .map(|(_, l)| token_of(l))
            .sum();
        let prev_tokens: usize = parts[parts.len() - 2]
            .iter()
            .map(|(_, l)| token_of(l))
            .sum();
        if tail_tokens < min_tokens && prev_tokens + tail_tokens <= max_tokens {
            if let Some(tail) = parts.pop() {
                if let Some(prev) = parts.last_mut() {
                    let prev_last_line = prev.last().map(|(n, _)| *n).unwrap_or(0);
                    for (line_no, line) in tail {
                        // Skip lines the overlap already carried over
                        if line_no > prev_last_line {
                            prev.push((line_no, line));
                        }
                    }
                }
            }
        }
    }

    parts
        .into_iter()
        .map(|part| {
            let start_line = part.first().map(|(n, _)| *n).unwrap_or(first_line);
            let end_line = part.last().map(|(n, _)| *n).unwrap_or(start_line);
            let text = part
                .iter()
                .map(|(_, l)| l.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            LinePart {
                start_line,
                end_line,
                text,
            }
        })
        .collect()
}

fn overlap_tail(part: &[(usize, String)], overlap: Overlap) -> Vec<(usize, String)> {
    match overlap {
        Overlap::Lines(n) => {
            if n == 0 || part.len() <= n {
                return Vec::new();
            }
            part[part.len() - n..].to_vec()
        }
        Overlap::Tokens(budget) => {
            if budget == 0 {
                return Vec::new();
            }
            let mut carried = Vec::new();
            let mut tokens = 0usize;
            for item in part.iter().rev() {
                let t = approx_tokens(&item.1);
                if tokens + t > budget || carried.len() + 1 >= part.len() {
                    break;
                }
                tokens += t;
                carried.push(item.clone());
            }
            carried.reverse();
            carried
        }
    }
}

/// Cut a single overlong line into char windows within the budget
fn cut_long_line(line: &str, max_tokens: usize) -> Vec<String> {
    let max_chars = max_tokens.saturating_mul(4).max(4);
    if line.chars().count() <= max_chars {
        return vec![line.to_string()];
    }
    let chars: Vec<char> = line.chars().collect();
    chars
        .chunks(max_chars)
        .map(|window| window.iter().collect())
        .collect()
}
