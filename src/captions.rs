#![forbid(unsafe_code)]

//! Caption track discovery and conversion.

use anyhow::{Result, anyhow};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

static CAPTION_TRACK_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"captionTracks":\s*\[\s*\{.*?"baseUrl":\s*"((?:[^"\\]|\\.)*)""#)
        .expect("valid caption track pattern")
});

/// One timed caption cue.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionLine {
    pub start: f64,
    pub text: String,
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Finds the first caption track URL embedded in a watch page.
pub fn extract_caption_url(html: &str) -> Option<String> {
    let captures = CAPTION_TRACK_URL.captures(html)?;
    let raw = captures.get(1)?.as_str();
    let url = unescape_js(raw);
    if url.starts_with("http") {
        Some(url)
    } else if let Some(rest) = url.strip_prefix("//") {
        Some(format!("https://{rest}"))
    } else {
        None
    }
}

/// Undoes the escaping of a JSON string literal embedded in page script.
fn unescape_js(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{raw}\"")).unwrap_or_else(|_| {
        raw.replace("\\u0026", "&")
            .replace("\\/", "/")
            .replace("\\\\", "\\")
    })
}

fn selector(css: &'static str) -> Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow!("invalid selector {css}: {err:?}"))
}

/// Decodes one caption cue. Track XML escapes its markup twice, so the text
/// is parsed a second time to drop inline tags and resolve entities.
fn cue_text(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    let text: String = fragment.root_element().text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Every `<text start="..">` cue of a caption track, in document order.
pub fn caption_lines(xml: &str) -> Result<Vec<CaptionLine>> {
    let document = Html::parse_document(xml);
    let text = selector("text")?;
    let mut lines = Vec::new();
    for cue in document.select(&text) {
        let start = cue
            .value()
            .attr("start")
            .and_then(|value| value.parse::<f64>().ok())
            .unwrap_or(0.0);
        let raw: String = cue.text().collect();
        let text = cue_text(&raw);
        if !text.is_empty() {
            lines.push(CaptionLine { start, text });
        }
    }
    Ok(lines)
}

/// Caption track XML flattened into plain text, one space between cues.
pub fn caption_text(xml: &str) -> Result<String> {
    Ok(caption_lines(xml)?
        .into_iter()
        .map(|line| line.text)
        .collect::<Vec<_>>()
        .join(" "))
}

/// `#HH:MM:SS-cc#` marker for a cue start given in seconds.
pub fn format_timestamp(seconds: f64) -> String {
    let centis = (seconds.max(0.0) * 100.0).round() as u64;
    let total_seconds = centis / 100;
    format!(
        "#{:02}:{:02}:{:02}-{:02}#",
        total_seconds / 3600,
        (total_seconds % 3600) / 60,
        total_seconds % 60,
        centis % 100
    )
}

/// One `#HH:MM:SS-cc# text` line per cue.
pub fn timestamped_transcript(lines: &[CaptionLine]) -> String {
    lines
        .iter()
        .map(|line| format!("{} {}\n", format_timestamp(line.start), line.text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK: &str = r#"<?xml version="1.0" encoding="utf-8" ?><transcript><text start="0.5" dur="2.1">Hello &amp;amp; welcome</text><text start="3.25" dur="1">it&amp;#39;s &lt;font color=&quot;#fff&quot;&gt;great&lt;/font&gt;</text><text start="5" dur="1">   </text></transcript>"#;

    #[test]
    fn caption_lines_decode_double_escaping() -> Result<()> {
        let lines = caption_lines(TRACK)?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].start, 0.5);
        assert_eq!(lines[0].text, "Hello & welcome");
        assert_eq!(lines[1].text, "it's great");
        assert_eq!(caption_text(TRACK)?, "Hello & welcome it's great");
        Ok(())
    }

    #[test]
    fn timestamps_render_hours_minutes_seconds() {
        assert_eq!(format_timestamp(0.5), "#00:00:00-50#");
        assert_eq!(format_timestamp(3723.25), "#01:02:03-25#");
        let transcript = timestamped_transcript(&[CaptionLine {
            start: 61.0,
            text: "hi".into(),
        }]);
        assert_eq!(transcript, "#00:01:01-00# hi\n");
    }

    #[test]
    fn caption_url_is_unescaped() {
        let page = r#"<script>var x = {"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[{"baseUrl":"https:\/\/www.youtube.com\/api\/timedtext?v=abc\u0026lang=en\u0026fmt=srv1","name":{"simpleText":"English"}}]}}};</script>"#;
        assert_eq!(
            extract_caption_url(page).as_deref(),
            Some("https://www.youtube.com/api/timedtext?v=abc&lang=en&fmt=srv1")
        );
        assert_eq!(extract_caption_url("<html>no captions</html>"), None);
    }
}
