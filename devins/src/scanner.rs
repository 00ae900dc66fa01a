//! Marker scanner.
//!
//! One forward pass over the input that reports where regions and fences
//! open and close. Nothing here validates nesting or builds blocks; an
//! unterminated region or fence is an ordinary outcome, recorded as an open
//! marker with `closed: false`.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static REGION_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<cmd>|<devin>|<thinking>|<!--\s*walkthrough_start\s*-->")
        .expect("region open pattern")
});

static WALKTHROUGH_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!--\s*walkthrough_end\s*-->").expect("walkthrough end pattern"));

/// The kind of tagged region a marker belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// `<cmd>…</cmd>` (or the `<devin>…</devin>` alias).
    Command,
    /// `<thinking>…</thinking>`.
    Thinking,
    /// `<!-- walkthrough_start -->…<!-- walkthrough_end -->`.
    Walkthrough,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerKind {
    RegionOpen { region: RegionKind, closed: bool },
    RegionClose(RegionKind),
    /// Opening fence line. `language` is the trimmed tag, `None` when empty.
    FenceOpen { language: Option<String>, closed: bool },
    /// Closing fence line, newline excluded. `implicit` fences are closed by
    /// a region open marker rather than a ``` line and have an empty span.
    FenceClose { implicit: bool },
}

/// A marker and the byte range of its delimiter text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub kind: MarkerKind,
    pub span: Range<usize>,
}

/// Result of a scan: markers in source order plus line start offsets.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub markers: Vec<Marker>,
    pub line_starts: Vec<usize>,
}

impl ScanResult {
    /// 0-based line containing `offset`.
    pub fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next.saturating_sub(1),
        }
    }
}

/// The result of a forward search, kept while it still lies at or after the
/// cursor. The cursor only moves forward, so a kept hit is still the first one.
struct Lookahead<T> {
    found: Option<Option<(Range<usize>, T)>>,
}

impl<T> Default for Lookahead<T> {
    fn default() -> Self {
        Lookahead { found: None }
    }
}

impl<T: Clone> Lookahead<T> {
    fn get(
        &mut self,
        from: usize,
        search: impl FnOnce(usize) -> Option<(Range<usize>, T)>,
    ) -> Option<(Range<usize>, T)> {
        let stale = match &self.found {
            None => true,
            Some(Some((span, _))) => span.start < from,
            Some(None) => false,
        };
        if stale {
            self.found = Some(search(from));
        }
        self.found.clone().flatten()
    }
}

pub struct TokenScanner<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> TokenScanner<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        TokenScanner {
            source,
            line_starts,
        }
    }

    pub fn scan(self) -> ScanResult {
        let mut markers = Vec::new();
        let mut regions = Lookahead::default();
        let mut fences = Lookahead::default();
        let mut pos = 0;

        while pos < self.source.len() {
            let region = regions.get(pos, |from| self.next_region_open(from));
            let fence = fences.get(pos, |from| self.next_fence_open(from));

            let take_fence = match (&region, &fence) {
                (Some((region_span, _)), Some((fence_line, _))) => fence_line.start < region_span.start,
                (None, Some(_)) => true,
                _ => false,
            };

            if take_fence {
                let Some((line, language)) = fence else { break };
                let body_start = self.line_end_with_newline(&line);
                let region = regions.get(body_start, |from| self.next_region_open(from));
                pos = self.scan_fence(line, language, region, &mut markers);
            } else if let Some((span, kind)) = region {
                pos = self.scan_region(span, kind, &mut markers);
            } else {
                break;
            }
        }

        ScanResult {
            markers,
            line_starts: self.line_starts,
        }
    }

    // ----- Regions -----

    fn next_region_open(&self, from: usize) -> Option<(Range<usize>, RegionKind)> {
        let found = REGION_OPEN.find_at(self.source, from)?;
        let kind = match found.as_str() {
            "<cmd>" | "<devin>" => RegionKind::Command,
            "<thinking>" => RegionKind::Thinking,
            _ => RegionKind::Walkthrough,
        };
        Some((found.range(), kind))
    }

    fn find_region_close(&self, open: &str, kind: RegionKind, from: usize) -> Option<Range<usize>> {
        let rest = &self.source[from..];
        let found = match kind {
            RegionKind::Walkthrough => WALKTHROUGH_END.find(rest).map(|m| m.range()),
            RegionKind::Command | RegionKind::Thinking => {
                let close = format!("</{}", &open[1..]);
                rest.find(&close).map(|at| at..at + close.len())
            }
        }?;
        Some(from + found.start..from + found.end)
    }

    /// Emit a region open marker (and its close, if any). Returns the new cursor.
    fn scan_region(&self, open: Range<usize>, kind: RegionKind, markers: &mut Vec<Marker>) -> usize {
        let open_text = &self.source[open.clone()];
        let close = self.find_region_close(open_text, kind, open.end);
        markers.push(Marker {
            kind: MarkerKind::RegionOpen {
                region: kind,
                closed: close.is_some(),
            },
            span: open,
        });
        match close {
            Some(span) => {
                let end = span.end;
                markers.push(Marker {
                    kind: MarkerKind::RegionClose(kind),
                    span,
                });
                end
            }
            None => self.source.len(),
        }
    }

    // ----- Fences -----

    /// The next line at or after `from` that opens a fence.
    fn next_fence_open(&self, from: usize) -> Option<(Range<usize>, Option<String>)> {
        let first = match self.line_starts.binary_search(&from) {
            Ok(line) => line,
            Err(next) => next,
        };
        (first..self.line_starts.len()).find_map(|line| {
            let span = self.line_span(line);
            fence_language(&self.source[span.clone()]).map(|language| (span, language))
        })
    }

    /// Emit a fence open marker and its close. `region` is the first region
    /// open at or after the fence body. Returns the new cursor.
    fn scan_fence(
        &self,
        open_line: Range<usize>,
        language: Option<String>,
        region: Option<(Range<usize>, RegionKind)>,
        markers: &mut Vec<Marker>,
    ) -> usize {
        let open_index = markers.len();
        let body_start = self.line_end_with_newline(&open_line);
        markers.push(Marker {
            kind: MarkerKind::FenceOpen {
                language,
                closed: false,
            },
            span: open_line.start..body_start,
        });

        let until = region
            .as_ref()
            .map_or(self.source.len(), |(span, _)| span.start);
        let close = self.next_fence_close(body_start, until);

        let (end, implicit, span) = match (close, region) {
            (Some(close), Some((region, _))) if region.start < close.start => {
                (region.start, true, region.start..region.start)
            }
            (Some(close), _) => (self.line_end_with_newline(&close), false, close),
            (None, Some((region, _))) => (region.start, true, region.start..region.start),
            (None, None) => return self.source.len(),
        };

        if let MarkerKind::FenceOpen { closed, .. } = &mut markers[open_index].kind {
            *closed = true;
        }
        markers.push(Marker {
            kind: MarkerKind::FenceClose { implicit },
            span,
        });
        end
    }

    /// The first closing ``` line starting in `from..until`.
    fn next_fence_close(&self, from: usize, until: usize) -> Option<Range<usize>> {
        let first = self.line_starts.binary_search(&from).ok()?;
        (first..self.line_starts.len())
            .map(|line| self.line_span(line))
            .take_while(|span| span.start < until)
            .find(|span| self.source[span.clone()].trim() == "```")
    }

    /// Byte range of a line without its terminating newline.
    fn line_span(&self, line: usize) -> Range<usize> {
        let start = self.line_starts[line];
        let end = self
            .line_starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.source.len());
        start..end
    }

    fn line_end_with_newline(&self, line: &Range<usize>) -> usize {
        if line.end < self.source.len() {
            line.end + 1
        } else {
            line.end
        }
    }
}

/// If `line` opens a fence, return its language tag.
///
/// The tag is the run of word, `#`, `+` and space characters after the
/// backticks, trimmed.
pub fn fence_language(line: &str) -> Option<Option<String>> {
    let rest = line.trim_start().strip_prefix("```")?;
    let end = rest
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || matches!(c, '_' | '#' | '+' | ' ')))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    let tag = rest[..end].trim();
    Some((!tag.is_empty()).then(|| tag.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<MarkerKind> {
        TokenScanner::new(source)
            .scan()
            .markers
            .into_iter()
            .map(|m| m.kind)
            .collect()
    }

    #[test]
    fn fence_with_language() {
        assert_eq!(
            kinds("```java\npublic class A{}\n```"),
            vec![
                MarkerKind::FenceOpen {
                    language: Some("java".into()),
                    closed: true
                },
                MarkerKind::FenceClose { implicit: false },
            ]
        );
    }

    #[test]
    fn unterminated_fence() {
        assert_eq!(
            kinds("```java\npublic class A{}"),
            vec![MarkerKind::FenceOpen {
                language: Some("java".into()),
                closed: false
            }]
        );
    }

    #[test]
    fn region_markers_inline() {
        let scan = TokenScanner::new("<cmd>/write:f1</cmd><cmd>/write:f2</cmd>").scan();
        assert_eq!(scan.markers.len(), 4);
        assert_eq!(scan.markers[0].span, 0..5);
        assert_eq!(scan.markers[1].span, 14..20);
        assert_eq!(scan.markers[2].span, 20..25);
    }

    #[test]
    fn fences_inside_region_are_text() {
        assert_eq!(
            kinds("<cmd>\n/write:a.kt\n```kotlin\nfun a() {}\n```\n</cmd>"),
            vec![
                MarkerKind::RegionOpen {
                    region: RegionKind::Command,
                    closed: true
                },
                MarkerKind::RegionClose(RegionKind::Command),
            ]
        );
    }

    #[test]
    fn region_interrupts_open_fence() {
        assert_eq!(
            kinds("```text\nhello\n<cmd>/dir:.</cmd>"),
            vec![
                MarkerKind::FenceOpen {
                    language: Some("text".into()),
                    closed: true
                },
                MarkerKind::FenceClose { implicit: true },
                MarkerKind::RegionOpen {
                    region: RegionKind::Command,
                    closed: true
                },
                MarkerKind::RegionClose(RegionKind::Command),
            ]
        );
    }

    #[test]
    fn close_tag_must_match_open_spelling() {
        assert_eq!(
            kinds("<devin>/dir:.</cmd>"),
            vec![MarkerKind::RegionOpen {
                region: RegionKind::Command,
                closed: false
            }]
        );
    }

    #[test]
    fn walkthrough_tolerates_spacing() {
        assert_eq!(
            kinds("<!--  walkthrough_start  -->\nsteps\n<!--walkthrough_end-->"),
            vec![
                MarkerKind::RegionOpen {
                    region: RegionKind::Walkthrough,
                    closed: true
                },
                MarkerKind::RegionClose(RegionKind::Walkthrough),
            ]
        );
    }

    #[test]
    fn alternating_regions_and_fences() {
        let source = "<cmd>/dir:a</cmd>\n```kotlin\nval a = 1\n```\n<cmd>\n```\n</cmd>\n```text\nopen\n<thinking>t</thinking>\n";
        let fence = |language: &str| MarkerKind::FenceOpen {
            language: Some(language.into()),
            closed: true,
        };
        let region = || MarkerKind::RegionOpen {
            region: RegionKind::Command,
            closed: true,
        };
        assert_eq!(
            kinds(source),
            vec![
                region(),
                MarkerKind::RegionClose(RegionKind::Command),
                fence("kotlin"),
                MarkerKind::FenceClose { implicit: false },
                region(),
                MarkerKind::RegionClose(RegionKind::Command),
                fence("text"),
                MarkerKind::FenceClose { implicit: true },
                MarkerKind::RegionOpen {
                    region: RegionKind::Thinking,
                    closed: true
                },
                MarkerKind::RegionClose(RegionKind::Thinking),
            ]
        );
    }

    #[test]
    fn many_regions_without_fences() {
        let source = "<cmd>/dir:.</cmd>\n".repeat(20_000);
        let scan = TokenScanner::new(&source).scan();
        assert_eq!(scan.markers.len(), 40_000);
        assert!(scan.markers.iter().all(|m| !matches!(m.kind, MarkerKind::FenceOpen { .. })));
    }

    #[test]
    fn tag_capture() {
        assert_eq!(fence_language("```http request"), Some(Some("http request".into())));
        assert_eq!(fence_language("  ```c#"), Some(Some("c#".into())));
        assert_eq!(fence_language("```"), Some(None));
        assert_eq!(fence_language("```{json}"), Some(None));
        assert_eq!(fence_language("text"), None);
    }

    #[test]
    fn line_lookup() {
        let scan = TokenScanner::new("a\nbb\nccc").scan();
        assert_eq!(scan.line_of(0), 0);
        assert_eq!(scan.line_of(2), 1);
        assert_eq!(scan.line_of(3), 1);
        assert_eq!(scan.line_of(6), 2);
    }
}
