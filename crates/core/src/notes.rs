//! Speaker-note extraction from markdown slide decks.
//!
//! A deck is split into slides at top-level thematic breaks (`---`), and
//! every `<!-- ... -->` comment inside a slide becomes part of its narration.
//! A slide without narration fails the whole document.

use std::{ops::Range, sync::LazyLock};

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use regex::Regex;

use crate::{
    error::{Result, SlidecastError},
    types::SlideNote,
};

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--(.*?)-->").expect("valid comment regex"));

static ATX_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}#{1,2}[ \t]+(.+?)[ \t#]*$").expect("valid heading regex"));

const UNTITLED: &str = "untitled";

/// How slide boundaries are located.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SplitStrategy {
    /// Top-level CommonMark thematic breaks. Rules inside code fences,
    /// HTML blocks, lists and block quotes never split a slide.
    #[default]
    Structural,
    /// Any line that trims to `---`. Cannot tell a decorative rule or a
    /// `---` inside a code fence from a slide break.
    Lines,
}

struct Segment {
    body: String,
    title: Option<String>,
}

/// Extract one narration per slide.
pub fn extract_notes(content: &str, strategy: SplitStrategy) -> Result<Vec<SlideNote>> {
    let body = strip_front_matter(content);
    let segments = match strategy {
        SplitStrategy::Structural => split_structural(body),
        SplitStrategy::Lines => split_lines(body),
    };

    let mut notes = Vec::with_capacity(segments.len());
    for (i, segment) in segments.into_iter().enumerate() {
        let slide_number = i + 1;
        let comments = collect_comments(&segment.body);
        if comments.is_empty() {
            return Err(SlidecastError::MissingNarration {
                slide_number,
                title: segment.title.unwrap_or_else(|| UNTITLED.to_string()),
            });
        }

        notes.push(SlideNote {
            slide_number,
            title: segment.title,
            text: comments.join("\n"),
        });
    }

    Ok(notes)
}

/// Remove a leading `---` ... `---` block, along with a UTF-8 byte order
/// mark. Without a closing delimiter the rest of the content is kept.
pub fn strip_front_matter(content: &str) -> &str {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut lines = content.split_inclusive('\n');
    match lines.next() {
        Some(first) if first.trim() == "---" => {}
        _ => return content,
    }

    let mut offset = content.split_inclusive('\n').next().map_or(0, str::len);
    for line in lines {
        offset += line.len();
        if line.trim() == "---" {
            return &content[offset..];
        }
    }

    content
}

fn collect_comments(segment: &str) -> Vec<String> {
    COMMENT_RE
        .captures_iter(segment)
        .filter_map(|cap| {
            let body = cap.get(1)?.as_str().trim();
            (!body.is_empty()).then(|| body.to_string())
        })
        .collect()
}

fn split_structural(body: &str) -> Vec<Segment> {
    let mut depth = 0usize;
    let mut breaks: Vec<Range<usize>> = Vec::new();
    let mut opaque: Vec<Range<usize>> = Vec::new();
    let mut headings: Vec<(usize, String)> = Vec::new();
    let mut open_heading: Option<(usize, String)> = None;

    for (event, range) in Parser::new_ext(body, Options::empty()).into_offset_iter() {
        match event {
            Event::Start(tag) => {
                match tag {
                    Tag::CodeBlock(_) => opaque.push(range.clone()),
                    Tag::Heading { level, .. }
                        if depth == 0 && matches!(level, HeadingLevel::H1 | HeadingLevel::H2) =>
                    {
                        open_heading = Some((range.start, String::new()));
                    }
                    _ => {}
                }
                depth += 1;
            }
            Event::End(tag) => {
                depth = depth.saturating_sub(1);
                if matches!(tag, TagEnd::Heading(_))
                    && let Some((offset, text)) = open_heading.take()
                {
                    headings.push((offset, text.trim().to_string()));
                }
            }
            Event::Code(text) => {
                opaque.push(range);
                if let Some((_, heading)) = open_heading.as_mut() {
                    heading.push_str(&text);
                }
            }
            Event::Text(text) => {
                if let Some((_, heading)) = open_heading.as_mut() {
                    heading.push_str(&text);
                }
            }
            Event::Rule if depth == 0 => breaks.push(range),
            _ => {}
        }
    }

    let mut bounds = Vec::with_capacity(breaks.len() + 1);
    let mut start = 0;
    for rule in &breaks {
        bounds.push(start..rule.start);
        start = rule.end;
    }
    bounds.push(start..body.len());

    bounds
        .into_iter()
        .filter(|r| !body[r.clone()].trim().is_empty())
        .map(|r| Segment {
            body: mask(body, &r, &opaque),
            title: headings
                .iter()
                .find(|(offset, text)| r.contains(offset) && !text.is_empty())
                .map(|(_, text)| text.clone()),
        })
        .collect()
}

/// Copy `range` of `body`, replacing code spans and blocks with newlines so
/// that comments quoted as code are not read as narration.
fn mask(body: &str, range: &Range<usize>, opaque: &[Range<usize>]) -> String {
    let mut out = String::with_capacity(range.len());
    let mut cursor = range.start;
    for hole in opaque
        .iter()
        .filter(|o| o.start >= range.start && o.end <= range.end)
    {
        if hole.start < cursor {
            continue;
        }
        out.push_str(&body[cursor..hole.start]);
        out.push('\n');
        cursor = hole.end;
    }
    out.push_str(&body[cursor..range.end]);
    out
}

fn split_lines(body: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = String::new();

    for line in body.lines() {
        if line.trim() == "---" {
            push_line_segment(&mut segments, std::mem::take(&mut current));
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    push_line_segment(&mut segments, current);

    segments
}

fn push_line_segment(segments: &mut Vec<Segment>, body: String) {
    if body.trim().is_empty() {
        return;
    }
    let title = body
        .lines()
        .find_map(|line| ATX_HEADING_RE.captures(line))
        .map(|cap| cap[1].trim().to_string());
    segments.push(Segment { body, title });
}
