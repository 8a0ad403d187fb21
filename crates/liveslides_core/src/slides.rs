//! Text to slide compilation.
//!
//! The editor's plain text is compiled into an ordered list of [`Slide`]s plus
//! one [`SlideBoundary`] per slide. Both come out of the same traversal, so the
//! line-color gutter an editor paints from the boundaries can never disagree
//! with the slide list.
//!
//! # Rules
//!
//! ```text
//! Parent            -> [Parent]
//!     Child 1       -> [Parent, Child 1]
//!     Child 2       -> [Parent, Child 2]
//!                   (blank line separates slides)
//! Line A            -> [Line A, Line B]
//! Line B
//!
//! \tOrphan          -> [Orphan]
//! ```
//!
//! - A blank line separates slides and is never part of one.
//! - A line indented by a tab or four spaces is a child of the parent line
//!   above it; without an open parent it stands alone as an orphan slide.
//! - A parent followed by indented lines expands into a parent-only slide plus
//!   one `[parent, child]` slide per child.
//! - A parent followed by plain lines groups them all into one slide.
//!
//! The editor's list-formatting marker ([`BULLET_MARKER`]) is removed before
//! any of these decisions are made.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Marker the notepad's list-formatting feature inserts in front of a line.
pub const BULLET_MARKER: &str = "•\t";

/// Colors assigned to slides in emission order.
pub const SLIDE_PALETTE: [&str; 8] = [
    "#3B82F6", "#10B981", "#F59E0B", "#EF4444", "#8B5CF6", "#EC4899", "#14B8A6", "#F97316",
];

/// A single line of text on a slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SlideItem {
    /// Line content with indentation and bullet marker removed
    pub text: String,
    /// Whether this line was indented beneath a parent line
    pub is_sub_item: bool,
}

impl SlideItem {
    fn main(text: &str) -> Self {
        Self {
            text: text.to_string(),
            is_sub_item: false,
        }
    }

    fn sub(text: &str) -> Self {
        Self {
            text: text.to_string(),
            is_sub_item: true,
        }
    }
}

/// A group of lines displayed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Slide {
    /// Lines on this slide, in display order
    pub items: Vec<SlideItem>,
    /// Display color from [`SLIDE_PALETTE`]; carries no meaning beyond grouping
    pub color: String,
}

/// Range of source lines that produced one slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SlideBoundary {
    /// First contributing line (zero-based)
    pub start_line: usize,
    /// Last contributing line (zero-based, inclusive)
    pub end_line: usize,
    /// Same color as the slide at `slide_index`
    pub color: String,
    /// Index of the slide in the compiled list
    pub slide_index: usize,
}

/// Output of [`compile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledText {
    /// Slides in display order
    pub slides: Vec<Slide>,
    /// One boundary per slide, in the same order
    pub boundaries: Vec<SlideBoundary>,
}

impl CompiledText {
    /// Number of compiled slides.
    pub fn len(&self) -> usize {
        self.slides.len()
    }

    /// Whether the text produced no slides at all.
    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }
}

/// Returns the palette color for the slide at `index`.
pub fn slide_color(index: usize) -> &'static str {
    SLIDE_PALETTE[index % SLIDE_PALETTE.len()]
}

/// Compile editor text into slides and line boundaries.
///
/// Never fails: every string, including the empty one, is valid input.
pub fn compile(text: &str) -> CompiledText {
    let mut state = ScanState::Scanning;
    let mut out = SlideEmitter::default();

    for (number, raw) in text.split('\n').enumerate() {
        let line = classify(number, raw);
        state = state.step(line, &mut out);
    }
    state.finish(&mut out);

    out.into_compiled()
}

/// A source line after marker stripping.
#[derive(Debug, Clone, Copy)]
enum Line<'a> {
    Blank,
    Plain { number: usize, text: &'a str },
    Indented { number: usize, text: &'a str },
}

fn classify(number: usize, raw: &str) -> Line<'_> {
    let raw = raw.strip_suffix('\r').unwrap_or(raw);
    let (indented, body) = if let Some(rest) = raw.strip_prefix('\t') {
        (true, rest)
    } else if let Some(rest) = raw.strip_prefix("    ") {
        (true, rest)
    } else {
        (false, raw)
    };

    let body = body.trim_start();
    let body = body.strip_prefix(BULLET_MARKER).unwrap_or(body);
    let text = body.trim();

    if text.is_empty() {
        Line::Blank
    } else if indented {
        Line::Indented { number, text }
    } else {
        Line::Plain { number, text }
    }
}

/// Line that opened the current group.
#[derive(Debug, Clone, Copy)]
struct Parent<'a> {
    number: usize,
    text: &'a str,
}

#[derive(Debug)]
enum ScanState<'a> {
    /// No open parent.
    Scanning,
    /// A parent was read; the next line decides between children and siblings.
    InParentLookahead(Parent<'a>),
    /// The parent has been emitted and each indented line adds a child slide.
    InChildRun(Parent<'a>),
    /// Plain lines are being collected into one slide.
    InSiblingRun {
        first: usize,
        last: usize,
        items: Vec<&'a str>,
    },
}

impl<'a> ScanState<'a> {
    fn step(self, line: Line<'a>, out: &mut SlideEmitter) -> Self {
        match (self, line) {
            (ScanState::Scanning, Line::Blank) => ScanState::Scanning,
            (ScanState::Scanning, Line::Indented { number, text }) => {
                out.push(number, number, vec![SlideItem::main(text)]);
                ScanState::Scanning
            }
            (ScanState::Scanning, Line::Plain { number, text }) => {
                ScanState::InParentLookahead(Parent { number, text })
            }

            (ScanState::InParentLookahead(parent), Line::Blank) => {
                out.push_parent(parent);
                ScanState::Scanning
            }
            (ScanState::InParentLookahead(parent), Line::Indented { number, text }) => {
                out.push_parent(parent);
                out.push_child(parent, number, text);
                ScanState::InChildRun(parent)
            }
            (ScanState::InParentLookahead(parent), Line::Plain { number, text }) => {
                ScanState::InSiblingRun {
                    first: parent.number,
                    last: number,
                    items: vec![parent.text, text],
                }
            }

            (ScanState::InChildRun(_), Line::Blank) => ScanState::Scanning,
            (ScanState::InChildRun(parent), Line::Indented { number, text }) => {
                out.push_child(parent, number, text);
                ScanState::InChildRun(parent)
            }
            (ScanState::InChildRun(_), Line::Plain { number, text }) => {
                ScanState::InParentLookahead(Parent { number, text })
            }

            (ScanState::InSiblingRun { first, items, .. }, Line::Plain { number, text }) => {
                let mut items = items;
                items.push(text);
                ScanState::InSiblingRun {
                    first,
                    last: number,
                    items,
                }
            }
            (sibling @ ScanState::InSiblingRun { .. }, Line::Blank) => {
                sibling.finish(out);
                ScanState::Scanning
            }
            // The sibling group is closed, so nothing is left to own the
            // indented line.
            (sibling @ ScanState::InSiblingRun { .. }, line @ Line::Indented { .. }) => {
                sibling.finish(out);
                ScanState::Scanning.step(line, out)
            }
        }
    }

    fn finish(self, out: &mut SlideEmitter) {
        match self {
            ScanState::Scanning | ScanState::InChildRun(_) => {}
            ScanState::InParentLookahead(parent) => out.push_parent(parent),
            ScanState::InSiblingRun { first, last, items } => {
                let items = items.into_iter().map(SlideItem::main).collect();
                out.push(first, last, items);
            }
        }
    }
}

/// Accumulates slides and their boundaries with a shared ordinal.
#[derive(Debug, Default)]
struct SlideEmitter {
    slides: Vec<Slide>,
    boundaries: Vec<SlideBoundary>,
}

impl SlideEmitter {
    fn push(&mut self, start_line: usize, end_line: usize, items: Vec<SlideItem>) {
        let slide_index = self.slides.len();
        let color = slide_color(slide_index).to_string();

        self.boundaries.push(SlideBoundary {
            start_line,
            end_line,
            color: color.clone(),
            slide_index,
        });
        self.slides.push(Slide { items, color });
    }

    fn push_parent(&mut self, parent: Parent<'_>) {
        self.push(parent.number, parent.number, vec![SlideItem::main(parent.text)]);
    }

    fn push_child(&mut self, parent: Parent<'_>, number: usize, text: &str) {
        self.push(
            parent.number,
            number,
            vec![SlideItem::main(parent.text), SlideItem::sub(text)],
        );
    }

    fn into_compiled(self) -> CompiledText {
        CompiledText {
            slides: self.slides,
            boundaries: self.boundaries,
        }
    }
}
