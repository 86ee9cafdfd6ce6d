//! Subtitle overlay renderer.
//!
//! Turns a corrected transcript plus a layout into an ordered list of
//! overlay commands, and those into an FFmpeg `drawtext` chain. Output is
//! deterministic for a given transcript and layout.
//!
//! Splitting rules:
//! - a word containing sentence punctuation ends the current line unit;
//! - a unit is also flushed once its clean-character count would exceed
//!   twice the single-line budget;
//! - a flushed unit longer than the single-line budget is drawn as two
//!   stacked lines sharing one `[start, end]` window;
//! - visible punctuation is stripped, but still acts as a split signal.

use narravo_models::{GenerationSettings, Transcript, TranscriptWord};

/// Punctuation that both splits lines and is stripped from display.
const PUNCTUATION: &[char] = &[
    '，', '。', '！', '？', '；', '、', ',', '.', '!', '?', ';', ':', '\'', '"', '(', ')', '[',
    ']', '{', '}', '<', '>',
];

/// Single-line character budget for portrait output.
const PORTRAIT_LINE_CHARS: usize = 15;
/// Single-line character budget for landscape output.
const LANDSCAPE_LINE_CHARS: usize = 18;

/// Where and how subtitles are drawn.
#[derive(Debug, Clone)]
pub struct SubtitleLayout {
    pub width: u32,
    pub height: u32,
    pub font_size: u32,
    pub color: String,
    /// Max characters on one rendered line.
    pub line_chars: usize,
    /// Vertical anchor for the (possibly stacked) subtitle block.
    pub base_y: i64,
}

impl SubtitleLayout {
    /// Derive the layout from generation settings. Portrait output sits at
    /// 70% height with a 15-char budget; landscape at 85% with 18.
    pub fn from_settings(settings: &GenerationSettings) -> Self {
        let (width, height) = settings.dimensions();
        let portrait = height > width;
        Self {
            width,
            height,
            font_size: settings.subtitle_style.font_size,
            color: settings.subtitle_style.color.clone(),
            line_chars: if portrait {
                PORTRAIT_LINE_CHARS
            } else {
                LANDSCAPE_LINE_CHARS
            },
            base_y: if portrait {
                (height as f64 * 0.70) as i64
            } else {
                (height as f64 * 0.85) as i64
            },
        }
    }

    fn line_spacing(&self) -> i64 {
        (self.font_size as f64 * 1.2) as i64
    }
}

/// One drawtext overlay: a single rendered line with its time window.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayCommand {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub x_expr: String,
    pub y: i64,
}

fn strip_punctuation(text: &str) -> String {
    text.chars()
        .filter(|c| !PUNCTUATION.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

fn contains_punctuation(text: &str) -> bool {
    text.chars().any(|c| PUNCTUATION.contains(&c))
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// A word kept for one subtitle unit: cleaned text plus original timing.
#[derive(Debug, Clone)]
struct UnitWord {
    text: String,
    start: f64,
    end: f64,
}

/// Render a full transcript into overlay commands.
pub fn render_overlays(transcript: &Transcript, layout: &SubtitleLayout) -> Vec<OverlayCommand> {
    let mut commands = Vec::new();

    for segment in &transcript.segments {
        if segment.has_word_timing() {
            render_from_words(&segment.words, layout, &mut commands);
        } else {
            render_from_segment_text(
                &segment.text,
                segment.start,
                segment.end,
                layout,
                &mut commands,
            );
        }
    }

    commands
}

/// Word-level path: accumulate words into units, flushing at punctuation
/// and at the two-line budget.
fn render_from_words(
    words: &[TranscriptWord],
    layout: &SubtitleLayout,
    commands: &mut Vec<OverlayCommand>,
) {
    let mut unit: Vec<UnitWord> = Vec::new();
    let mut unit_len = 0usize;

    for word in words {
        let has_punct = contains_punctuation(&word.word);
        let clean = strip_punctuation(&word.word);

        if clean.is_empty() {
            // Pure punctuation still ends the running unit.
            if has_punct && !unit.is_empty() {
                flush_unit(&mut unit, &mut unit_len, layout, commands);
            }
            continue;
        }

        let word_len = char_len(&clean);
        if unit_len + word_len > layout.line_chars * 2 && !unit.is_empty() {
            flush_unit(&mut unit, &mut unit_len, layout, commands);
        }

        unit.push(UnitWord {
            text: clean,
            start: word.start,
            end: word.end,
        });
        unit_len += word_len;

        if has_punct {
            flush_unit(&mut unit, &mut unit_len, layout, commands);
        }
    }

    if !unit.is_empty() {
        flush_unit(&mut unit, &mut unit_len, layout, commands);
    }
}

/// Emit one unit as one or two overlay commands.
fn flush_unit(
    unit: &mut Vec<UnitWord>,
    unit_len: &mut usize,
    layout: &SubtitleLayout,
    commands: &mut Vec<OverlayCommand>,
) {
    if unit.is_empty() {
        return;
    }
    let start = unit.first().map(|w| w.start).unwrap_or(0.0);
    let end = unit.last().map(|w| w.end).unwrap_or(start);
    let total_len = *unit_len;

    if total_len <= layout.line_chars {
        let text: String = unit.iter().map(|w| w.text.as_str()).collect();
        commands.push(OverlayCommand {
            text,
            start,
            end,
            x_expr: "(w-text_w)/2".to_string(),
            y: layout.base_y,
        });
    } else {
        // Two stacked lines split at the word boundary nearest the middle.
        let split_index = best_split_index(unit, total_len);
        let line1: String = unit[..split_index].iter().map(|w| w.text.as_str()).collect();
        let line2: String = unit[split_index..].iter().map(|w| w.text.as_str()).collect();
        let line1 = truncate_chars(&line1, layout.line_chars);
        let line2 = truncate_chars(&line2, layout.line_chars);

        let spacing = layout.line_spacing();
        let y1 = layout.base_y - spacing / 2;
        let y2 = layout.base_y + spacing / 2;

        commands.push(OverlayCommand {
            text: line1,
            start,
            end,
            x_expr: "(w-text_w)/2".to_string(),
            y: y1,
        });
        if !line2.is_empty() {
            commands.push(OverlayCommand {
                text: line2,
                start,
                end,
                x_expr: "(w-text_w)/2".to_string(),
                y: y2,
            });
        }
    }

    unit.clear();
    *unit_len = 0;
}

/// Word index whose boundary is closest to half the unit's characters.
fn best_split_index(unit: &[UnitWord], total_len: usize) -> usize {
    let mid = total_len / 2;
    let mut running = 0usize;
    for (i, word) in unit.iter().enumerate() {
        let word_len = char_len(&word.text);
        if running + word_len >= mid {
            let before = mid.abs_diff(running);
            let after = mid.abs_diff(running + word_len);
            return if before < after { i.max(1) } else { (i + 1).min(unit.len() - 1).max(1) };
        }
        running += word_len;
    }
    (unit.len() / 2).max(1)
}

/// Segment-level fallback: split the text at punctuation and the line
/// budget, then allocate the segment's duration proportionally to the
/// character count of each line.
fn render_from_segment_text(
    text: &str,
    seg_start: f64,
    seg_end: f64,
    layout: &SubtitleLayout,
    commands: &mut Vec<OverlayCommand>,
) {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if PUNCTUATION.contains(&c) {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_whitespace() {
            continue;
        }
        if char_len(&current) >= layout.line_chars {
            lines.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        return;
    }

    let total_duration = (seg_end - seg_start).max(0.0);
    let total_chars: usize = lines.iter().map(|l| char_len(l)).sum();
    let mut cursor = seg_start;

    for line in &lines {
        let share = if total_chars > 0 {
            total_duration * char_len(line) as f64 / total_chars as f64
        } else {
            total_duration / lines.len() as f64
        };
        let line_end = cursor + share;
        commands.push(OverlayCommand {
            text: line.clone(),
            start: cursor,
            end: line_end,
            x_expr: "(w-text_w)/2".to_string(),
            y: layout.base_y,
        });
        cursor = line_end;
    }
}

/// Escape text for a drawtext `text=` value.
fn escape_drawtext(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "'\\\\''")
        .replace(':', "\\:")
}

/// Serialize overlay commands into a comma-joined drawtext chain.
pub fn drawtext_filter(commands: &[OverlayCommand], layout: &SubtitleLayout) -> String {
    let filters: Vec<String> = commands
        .iter()
        .map(|cmd| {
            format!(
                "drawtext=text='{text}':fontsize={fs}:fontcolor={color}:\
                 borderw=5:bordercolor=black:shadowcolor=black@0.7:shadowx=4:shadowy=4:\
                 box=1:boxcolor=black@0.65:boxborderw=20:\
                 x={x}:y={y}:enable='between(t,{start:.3},{end:.3})'",
                text = escape_drawtext(&cmd.text),
                fs = layout.font_size,
                color = layout.color,
                x = cmd.x_expr,
                y = cmd.y,
                start = cmd.start,
                end = cmd.end,
            )
        })
        .collect();
    filters.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use narravo_models::TranscriptSegment;

    fn landscape_layout() -> SubtitleLayout {
        SubtitleLayout::from_settings(&GenerationSettings::default())
    }

    fn words(items: &[(&str, f64, f64)]) -> Vec<TranscriptWord> {
        items
            .iter()
            .map(|(w, s, e)| TranscriptWord {
                word: w.to_string(),
                start: *s,
                end: *e,
            })
            .collect()
    }

    fn transcript_with_words(items: &[(&str, f64, f64)]) -> Transcript {
        Transcript {
            segments: vec![TranscriptSegment {
                start: items.first().map(|w| w.1).unwrap_or(0.0),
                end: items.last().map(|w| w.2).unwrap_or(0.0),
                text: items.iter().map(|w| w.0).collect(),
                words: words(items),
            }],
            duration: items.last().map(|w| w.2).unwrap_or(0.0),
        }
    }

    #[test]
    fn layout_portrait_vs_landscape() {
        let landscape = landscape_layout();
        assert_eq!(landscape.line_chars, 18);
        assert_eq!(landscape.base_y, (1080.0 * 0.85) as i64);

        let portrait = SubtitleLayout::from_settings(&GenerationSettings {
            resolution: "1080x1920".into(),
            ..Default::default()
        });
        assert_eq!(portrait.line_chars, 15);
        assert_eq!(portrait.base_y, (1920.0 * 0.70) as i64);
    }

    #[test]
    fn short_sentence_is_one_unsplit_overlay() {
        let t = transcript_with_words(&[("他", 0.0, 0.4), ("望着", 0.4, 0.9), ("远方。", 0.9, 1.5)]);
        let cmds = render_overlays(&t, &landscape_layout());
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].text, "他望着远方");
        assert_eq!(cmds[0].y, landscape_layout().base_y);
        assert!((cmds[0].start - 0.0).abs() < f64::EPSILON);
        assert!((cmds[0].end - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn punctuation_word_forces_a_new_unit() {
        let t = transcript_with_words(&[
            ("他走了，", 0.0, 1.0),
            ("天黑了。", 1.0, 2.0),
        ]);
        let cmds = render_overlays(&t, &landscape_layout());
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].text, "他走了");
        assert_eq!(cmds[1].text, "天黑了");
        assert!(cmds[0].end <= cmds[1].start + f64::EPSILON);
    }

    #[test]
    fn long_unit_splits_into_two_stacked_lines() {
        // 24 clean chars with no punctuation: over the 18-char line budget,
        // under the 36-char flush budget.
        let t = transcript_with_words(&[
            ("春天的风吹过山谷", 0.0, 1.0),
            ("吹过原野和安静的", 1.0, 2.0),
            ("小小村庄与河流", 2.0, 3.0),
        ]);
        let layout = landscape_layout();
        let cmds = render_overlays(&t, &layout);
        assert_eq!(cmds.len(), 2);
        // Both lines share one time window.
        assert!((cmds[0].start - cmds[1].start).abs() < f64::EPSILON);
        assert!((cmds[0].end - cmds[1].end).abs() < f64::EPSILON);
        // Stacked around the baseline at 1.2x font size spacing.
        let spacing = layout.line_spacing();
        assert_eq!(cmds[0].y, layout.base_y - spacing / 2);
        assert_eq!(cmds[1].y, layout.base_y + spacing / 2);
        assert!(char_len(&cmds[0].text) <= layout.line_chars);
        assert!(char_len(&cmds[1].text) <= layout.line_chars);
    }

    #[test]
    fn segment_fallback_allocates_duration_proportionally() {
        let t = Transcript {
            segments: vec![TranscriptSegment {
                start: 0.0,
                end: 4.0,
                text: "他望着远方，一言不发。".into(),
                words: vec![],
            }],
            duration: 4.0,
        };
        let cmds = render_overlays(&t, &landscape_layout());
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].text, "他望着远方");
        assert_eq!(cmds[1].text, "一言不发");

        // Intervals are disjoint, monotone, and cover the segment.
        assert!((cmds[0].start - 0.0).abs() < 1e-9);
        assert!((cmds[0].end - cmds[1].start).abs() < 1e-9);
        assert!((cmds[1].end - 4.0).abs() < 1e-9);
        // 5 chars vs 4 chars of 9 total over 4 seconds.
        assert!((cmds[0].end - 4.0 * 5.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn filter_serialization_has_style_and_timing() {
        let layout = landscape_layout();
        let cmds = vec![OverlayCommand {
            text: "他望着远方".into(),
            start: 0.0,
            end: 1.5,
            x_expr: "(w-text_w)/2".into(),
            y: 918,
        }];
        let filter = drawtext_filter(&cmds, &layout);
        assert!(filter.starts_with("drawtext=text='他望着远方'"));
        assert!(filter.contains("fontsize=48"));
        assert!(filter.contains("fontcolor=white"));
        assert!(filter.contains("boxcolor=black@0.65"));
        assert!(filter.contains("x=(w-text_w)/2"));
        assert!(filter.contains("y=918"));
        assert!(filter.contains("enable='between(t,0.000,1.500)'"));
    }

    #[test]
    fn renderer_is_deterministic() {
        let t = transcript_with_words(&[
            ("他走了，", 0.0, 1.0),
            ("春风吹过安静的原野和村庄", 1.0, 3.0),
            ("天黑了。", 3.0, 4.0),
        ]);
        let layout = landscape_layout();
        let a = render_overlays(&t, &layout);
        let b = render_overlays(&t, &layout);
        assert_eq!(a, b);
    }
}
