//! Page content extraction
//!
//! Converts fetched HTML to Markdown: a readability-style container
//! pick first, then a DOM walk that strips chrome elements,
//! whitelists standard tags, and emits fenced code blocks with the
//! language detected from `class="language-..."`. Markdown sanitation
//! removes TOC noise and normalizes formatting quirks.

use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Extracted body below this length marks a page as sparse
pub const SPARSE_BODY_CHARS: usize = 400;
/// Fewer outgoing links than this marks a page as sparse
pub const SPARSE_LINK_COUNT: usize = 3;

const SPA_MARKERS: &[&str] = &[
    "__NEXT_DATA__",
    "window.__NUXT__",
    "data-reactroot",
    "ng-version",
    "id=\"___gatsby\"",
];

const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "svg", "form",
    "button", "iframe", "template", "dialog",
];

const CONTAINER_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role=\"main\"]",
    "#content",
    ".content",
    ".markdown-body",
    ".doc-content",
    ".docs-content",
    ".vp-doc",
];

/// Result of extracting one HTML page
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub markdown: String,
    pub title: Option<String>,
    pub links: Vec<String>,
}

/// Whether a plain-text body reads as markdown
pub fn looks_like_markdown(text: &str) -> bool {
    let mut signals = 0;
    for line in text.lines().take(200) {
        let trimmed = line.trim_start();
        if trimmed.starts_with("# ")
            || trimmed.starts_with("## ")
            || trimmed.starts_with("```")
            || trimmed.starts_with("- ")
            || trimmed.starts_with("* ")
        {
            signals += 1;
            if signals >= 2 {
                return true;
            }
        }
    }
    false
}

/// Extract main content from an HTML page as Markdown
pub fn extract_html_content(html: &str, base: &Url) -> ExtractedPage {
    let document = Html::parse_document(html);

    let title = page_title(&document);
    let links = extract_links_html(&document, base);

    // Readability-style: the densest known container wins; when that
    // yields too little, fall back to walking the whole body.
    let mut markdown = best_container(&document)
        .map(|el| element_to_markdown(el, base))
        .unwrap_or_default();
    if markdown.trim().len() < SPARSE_BODY_CHARS / 2 {
        if let Some(body) = select_first(&document, "body") {
            let from_body = element_to_markdown(body, base);
            if from_body.trim().len() > markdown.trim().len() {
                markdown = from_body;
            }
        }
    }

    ExtractedPage {
        markdown,
        title,
        links,
    }
}

/// Whether the page needs a headless re-fetch
pub fn is_sparse(markdown: &str, link_count: usize, html: &str) -> bool {
    if markdown.trim().len() < SPARSE_BODY_CHARS {
        return true;
    }
    if link_count < SPARSE_LINK_COUNT {
        return true;
    }
    SPA_MARKERS.iter().any(|marker| html.contains(marker))
}

fn select_first<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let parsed = Selector::parse(selector).ok()?;
    document.select(&parsed).next()
}

fn best_container<'a>(document: &'a Html) -> Option<ElementRef<'a>> {
    CONTAINER_SELECTORS
        .iter()
        .filter_map(|sel| select_first(document, sel))
        .max_by_key(|el| el.text().map(|t| t.len()).sum::<usize>())
}

fn page_title(document: &Html) -> Option<String> {
    if let Some(el) = select_first(document, "title") {
        let text = el.text().collect::<String>().trim().to_string();
        if !text.is_empty() {
            return Some(text);
        }
    }
    select_first(document, "h1")
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// All `<a href>` targets, resolved against the page URL
pub fn extract_links_html(document: &Html, base: &Url) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| !href.starts_with('#'))
        .filter_map(|href| base.join(href).ok())
        .map(|url| url.to_string())
        .collect()
}

/// Markdown links (`[t](url)`) from a markdown body
pub fn extract_links_markdown(markdown: &str, base: &Url) -> Vec<String> {
    let mut links = Vec::new();
    let mut rest = markdown;
    while let Some(open) = rest.find("](") {
        let after = &rest[open + 2..];
        let Some(close) = after.find(')') else { break };
        let target = after[..close].trim();
        if !target.is_empty() && !target.starts_with('#') {
            if let Ok(url) = base.join(target) {
                links.push(url.to_string());
            }
        }
        rest = &after[close + 1..];
    }
    links
}

fn element_to_markdown(root: ElementRef, base: &Url) -> String {
    let mut writer = MdWriter {
        out: String::new(),
        base,
    };
    writer.walk_block(root);
    writer.out.trim().to_string()
}

struct MdWriter<'a> {
    out: String,
    base: &'a Url,
}

impl MdWriter<'_> {
    fn walk_block(&mut self, el: ElementRef) {
        let tag = el.value().name();
        if SKIP_TAGS.contains(&tag) {
            return;
        }

        match tag {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = tag[1..].parse::<usize>().unwrap_or(1);
                let text = self.inline_text(el);
                if !text.trim().is_empty() {
                    self.block_break();
                    self.out.push_str(&"#".repeat(level));
                    self.out.push(' ');
                    self.out.push_str(text.trim());
                }
            }
            "pre" => {
                let code = el.text().collect::<String>();
                let language = code_language(el).unwrap_or_default();
                self.block_break();
                self.out.push_str("```");
                self.out.push_str(&language);
                self.out.push('\n');
                self.out.push_str(code.trim_end());
                self.out.push_str("\n```");
            }
            "p" | "blockquote" => {
                let text = self.inline_text(el);
                if !text.trim().is_empty() {
                    self.block_break();
                    if tag == "blockquote" {
                        for (i, line) in text.trim().lines().enumerate() {
                            if i > 0 {
                                self.out.push('\n');
                            }
                            self.out.push_str("> ");
                            self.out.push_str(line);
                        }
                    } else {
                        self.out.push_str(text.trim());
                    }
                }
            }
            "ul" | "ol" => {
                self.block_break();
                let ordered = tag == "ol";
                let mut index = 1;
                for child in el.child_elements() {
                    if child.value().name() != "li" {
                        continue;
                    }
                    let text = self.inline_text(child);
                    if text.trim().is_empty() {
                        continue;
                    }
                    if index > 1 {
                        self.out.push('\n');
                    }
                    if ordered {
                        self.out.push_str(&format!("{}. ", index));
                    } else {
                        self.out.push_str("- ");
                    }
                    self.out.push_str(text.trim());
                    index += 1;
                }
            }
            "table" => {
                let text = el.text().collect::<String>();
                if !text.trim().is_empty() {
                    self.block_break();
                    self.out.push_str(text.trim());
                }
            }
            _ => {
                // Container tags: recurse into element children, and
                // surface stray text nodes as paragraphs.
                for child in el.children() {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.walk_block(child_el);
                    } else if let Some(text) = child.value().as_text() {
                        let trimmed = text.trim();
                        if !trimmed.is_empty() {
                            self.block_break();
                            self.out.push_str(trimmed);
                        }
                    }
                }
            }
        }
    }

    /// Flatten an element's content to one inline string
    fn inline_text(&self, el: ElementRef) -> String {
        let mut out = String::new();
        self.inline_into(el, &mut out);
        out
    }

    fn inline_into(&self, el: ElementRef, out: &mut String) {
        for child in el.children() {
            if let Some(text) = child.value().as_text() {
                push_collapsed(out, text);
                continue;
            }
            let Some(child_el) = ElementRef::wrap(child) else {
                continue;
            };
            let tag = child_el.value().name();
            if SKIP_TAGS.contains(&tag) {
                continue;
            }
            match tag {
                "a" => {
                    let label = {
                        let mut s = String::new();
                        self.inline_into(child_el, &mut s);
                        s.trim().to_string()
                    };
                    let href = child_el.value().attr("href").unwrap_or("");
                    if label.is_empty() {
                        continue;
                    }
                    match self.base.join(href) {
                        Ok(url) if !href.starts_with('#') => {
                            out.push_str(&format!("[{}]({})", label, url));
                        }
                        _ => out.push_str(&label),
                    }
                }
                "code" => {
                    let code = child_el.text().collect::<String>();
                    out.push('`');
                    out.push_str(code.trim());
                    out.push('`');
                }
                "strong" | "b" => {
                    let mut s = String::new();
                    self.inline_into(child_el, &mut s);
                    if !s.trim().is_empty() {
                        out.push_str(&format!("**{}**", s.trim()));
                    }
                }
                "em" | "i" => {
                    let mut s = String::new();
                    self.inline_into(child_el, &mut s);
                    if !s.trim().is_empty() {
                        out.push_str(&format!("*{}*", s.trim()));
                    }
                }
                "br" => out.push('\n'),
                _ => self.inline_into(child_el, out),
            }
        }
    }

    fn block_break(&mut self) {
        if !self.out.is_empty() {
            self.out.push_str("\n\n");
        }
    }
}

fn push_collapsed(out: &mut String, text: &str) {
    let mut last_space = out.ends_with(|c: char| c.is_whitespace()) || out.is_empty();
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(ch);
            last_space = false;
        }
    }
}

fn code_language(pre: ElementRef) -> Option<String> {
    let mut candidates = vec![pre];
    if let Ok(selector) = Selector::parse("code") {
        candidates.extend(pre.select(&selector));
    }
    for el in candidates {
        if let Some(class) = el.value().attr("class") {
            for token in class.split_whitespace() {
                if let Some(lang) = token
                    .strip_prefix("language-")
                    .or_else(|| token.strip_prefix("lang-"))
                {
                    return Some(lang.to_string());
                }
            }
        }
    }
    None
}

/// Clean up extracted or negotiated markdown
pub fn sanitize_markdown(input: &str) -> String {
    let mut text = fix_mojibake(input);
    text = strip_html_blocks(&text, "script");
    text = strip_html_blocks(&text, "style");

    let mut out: Vec<String> = Vec::new();
    let mut in_fence = false;
    let mut blank_run = 0usize;
    let lines: Vec<&str> = text.lines().collect();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim_start();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            out.push(line.to_string());
            blank_run = 0;
            i += 1;
            continue;
        }

        if in_fence {
            // Escaped underscores leak out of some converters
            out.push(line.replace("\\_", "_"));
            i += 1;
            continue;
        }

        // Setext headings become ATX
        if i + 1 < lines.len() {
            let next = lines[i + 1].trim();
            if !line.trim().is_empty()
                && !next.is_empty()
                && (next.chars().all(|c| c == '=') || next.chars().all(|c| c == '-'))
                && next.len() >= 3
            {
                let marker = if next.starts_with('=') { "#" } else { "##" };
                out.push(format!("{} {}", marker, line.trim()));
                blank_run = 0;
                i += 2;
                continue;
            }
        }

        // Anchor-only list items are TOC noise
        if is_anchor_only_item(trimmed) || trimmed.eq_ignore_ascii_case("[[toc]]") {
            i += 1;
            continue;
        }

        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                i += 1;
                continue;
            }
            out.push(String::new());
        } else {
            blank_run = 0;
            out.push(line.to_string());
        }
        i += 1;
    }

    out.join("\n").trim().to_string()
}

/// `- [Title](#anchor)` with nothing else on the line
fn is_anchor_only_item(line: &str) -> bool {
    let Some(item) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) else {
        return false;
    };
    let item = item.trim();
    if !item.starts_with('[') || !item.ends_with(')') {
        return false;
    }
    match item.find("](") {
        Some(pos) => item[pos + 2..].starts_with('#'),
        None => false,
    }
}

fn strip_html_blocks(text: &str, tag: &str) -> String {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        match rest.to_ascii_lowercase().find(&open) {
            Some(start) => {
                out.push_str(&rest[..start]);
                match rest[start..].to_ascii_lowercase().find(&close) {
                    Some(end) => rest = &rest[start + end + close.len()..],
                    None => break,
                }
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }
    out
}

/// Common UTF-8-decoded-as-latin1 artifacts
fn fix_mojibake(text: &str) -> String {
    const FIXES: &[(&str, &str)] = &[
        ("â€™", "'"),
        ("â€˜", "'"),
        ("â€œ", "\""),
        ("â€\u{9d}", "\""),
        ("â€“", "–"),
        ("â€”", "—"),
        ("â€¦", "…"),
        ("Â·", "·"),
        ("Â ", " "),
    ];
    let mut out = text.to_string();
    for (from, to) in FIXES {
        if out.contains(from) {
            out = out.replace(from, to);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://hono.dev/docs/page").unwrap()
    }

    #[test]
    fn test_extract_basic_structure() {
        let html = r#"<html><head><title>Guide</title></head><body>
            <nav><a href="/">Home</a></nav>
            <main>
                <h1>Routing</h1>
                <p>Routes are <strong>fast</strong>.</p>
                <pre><code class="language-ts">app.get('/', handler)</code></pre>
                <ul><li>First</li><li>Second</li></ul>
            </main>
            <footer>copyright</footer>
        </body></html>"#;

        let page = extract_html_content(html, &base());
        assert_eq!(page.title.as_deref(), Some("Guide"));
        assert!(page.markdown.contains("# Routing"));
        assert!(page.markdown.contains("Routes are **fast**."));
        assert!(page.markdown.contains("```ts\napp.get('/', handler)\n```"));
        assert!(page.markdown.contains("- First\n- Second"));
        assert!(!page.markdown.contains("Home"));
        assert!(!page.markdown.contains("copyright"));
    }

    #[test]
    fn test_links_resolved_and_relative() {
        let html = r##"<body><main><p><a href="/docs/api">API</a> and
            <a href="guides">Guides</a> and <a href="#frag">skip</a></p></main></body>"##;
        let page = extract_html_content(html, &base());
        assert!(page.links.contains(&"https://hono.dev/docs/api".to_string()));
        assert!(page.links.contains(&"https://hono.dev/docs/guides".to_string()));
        assert_eq!(page.links.len(), 2);
        assert!(page.markdown.contains("[API](https://hono.dev/docs/api)"));
    }

    #[test]
    fn test_extract_links_markdown() {
        let md = "See [API](/docs/api) and [top](#top) and [ext](https://x.dev/a).";
        let links = extract_links_markdown(md, &base());
        assert_eq!(
            links,
            vec![
                "https://hono.dev/docs/api".to_string(),
                "https://x.dev/a".to_string()
            ]
        );
    }

    #[test]
    fn test_looks_like_markdown() {
        assert!(looks_like_markdown("# Title\n\n- item one\n- item two"));
        assert!(!looks_like_markdown("just a plain sentence in text"));
    }

    #[test]
    fn test_is_sparse() {
        assert!(is_sparse("tiny", 10, "<html></html>"));
        let body = "word ".repeat(200);
        assert!(is_sparse(&body, 1, "<html></html>"));
        assert!(is_sparse(&body, 10, "<div>__NEXT_DATA__</div>"));
        assert!(!is_sparse(&body, 10, "<html></html>"));
    }

    #[test]
    fn test_sanitize_collapses_blanks_and_setext() {
        let input = "Title\n=====\n\n\n\nbody text\n\nUnder\n-----\nmore";
        let output = sanitize_markdown(input);
        assert!(output.starts_with("# Title"));
        assert!(output.contains("## Under"));
        assert!(!output.contains("\n\n\n"));
    }

    #[test]
    fn test_sanitize_removes_toc_noise() {
        let input = "# Page\n\n- [Intro](#intro)\n- [Setup](#setup)\n- [Real link](/docs)\n\n[[toc]]\n\nbody";
        let output = sanitize_markdown(input);
        assert!(!output.contains("#intro"));
        assert!(!output.contains("[[toc]]"));
        assert!(output.contains("[Real link](/docs)"));
    }

    #[test]
    fn test_sanitize_unescapes_in_fences() {
        let input = "```py\nmy\\_var = 1\n```\nprose with \\_kept\\_";
        let output = sanitize_markdown(input);
        assert!(output.contains("my_var = 1"));
        assert!(output.contains("\\_kept\\_"));
    }

    #[test]
    fn test_sanitize_strips_script_and_mojibake() {
        let input = "before<script>alert(1)</script>after â€” dash";
        let output = sanitize_markdown(input);
        assert!(!output.contains("alert"));
        assert!(output.contains("beforeafter"));
        assert!(output.contains("— dash"));
    }
}
