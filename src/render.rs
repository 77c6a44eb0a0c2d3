//! Render pipeline — Markdown source to displayable markup, plus the
//! character-by-character reveal animation.
//!
//! The reveal is purely presentational: it runs over an already-complete
//! response string, and the stored message always holds the full text.

use regex::Regex;
use std::io::Write;
use std::sync::LazyLock;
use std::time::Duration;

use crate::prompt::Role;

// ── Engine ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkdownEngine {
    /// Full CommonMark rendering.
    Full,
    /// Regex-based fallback: bold, italic, inline code, links, line breaks.
    Minimal,
}

pub struct Renderer {
    engine: MarkdownEngine,
    animate: bool,
}

impl Renderer {
    pub fn new(engine: MarkdownEngine) -> Self {
        Self {
            engine,
            animate: true,
        }
    }

    /// Skip the reveal animation: `reveal` emits the fully rendered message
    /// as a single final frame.
    pub fn without_animation(mut self) -> Self {
        self.animate = false;
        self
    }

    /// User messages render as literal text — user input is never
    /// interpreted as markup. Assistant and system messages go through the
    /// Markdown path.
    pub fn render_message(&self, role: Role, content: &str) -> String {
        match role {
            Role::User => escape_html(content),
            Role::Assistant | Role::System => self.markdown(content),
        }
    }

    pub fn markdown(&self, source: &str) -> String {
        match self.engine {
            MarkdownEngine::Full => {
                let mut out = String::new();
                pulldown_cmark::html::push_html(&mut out, pulldown_cmark::Parser::new(source));
                out
            }
            MarkdownEngine::Minimal => simple_markdown(source),
        }
    }

    /// Reveal a complete response one character per tick, re-rendering the
    /// growing prefix through the Markdown path on every tick. The cursor
    /// marker is shown on every frame except the final one.
    pub async fn reveal<S: RevealSink>(&self, content: &str, sink: &mut S) {
        if !self.animate {
            sink.frame(&self.markdown(content), true);
            return;
        }

        let chars: Vec<char> = content.chars().collect();
        if chars.is_empty() {
            sink.frame("", true);
            return;
        }

        let mut ticker = tokio::time::interval(Duration::from_millis(REVEAL_TICK_MS));
        let mut prefix = String::with_capacity(content.len());
        for (i, c) in chars.iter().enumerate() {
            ticker.tick().await;
            prefix.push(*c);
            let rendered = self.markdown(&prefix);
            if i + 1 == chars.len() {
                sink.frame(&rendered, true);
            } else {
                sink.frame(&format!("{rendered}{CURSOR_MARKER}"), false);
            }
        }
    }
}

/// Fixed reveal tick, in milliseconds.
pub const REVEAL_TICK_MS: u64 = 20;

/// Shown at the end of every in-progress frame.
pub const CURSOR_MARKER: &str = "▌";

// ── Reveal sink ───────────────────────────────────────────────────────────────

/// Where reveal frames and the transient "thinking" placeholder go. The CLI
/// writes to the terminal; tests capture frames.
pub trait RevealSink {
    /// A placeholder is shown between request dispatch and response arrival.
    fn thinking_shown(&mut self);
    /// The placeholder is removed before the real message is inserted.
    fn thinking_removed(&mut self);
    /// One rendered frame of the reveal. `done` marks the final frame.
    fn frame(&mut self, rendered: &str, done: bool);
}

/// Terminal sink: redraws the in-progress message block in place using
/// cursor-up + clear, so the animation plays inside a scrolling terminal.
pub struct StdoutSink {
    lines_drawn: usize,
    thinking: bool,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            lines_drawn: 0,
            thinking: false,
        }
    }

    fn clear_drawn(&mut self, out: &mut impl Write) {
        if self.lines_drawn > 0 {
            let _ = write!(out, "\x1b[{}A\x1b[0J", self.lines_drawn);
            self.lines_drawn = 0;
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RevealSink for StdoutSink {
    fn thinking_shown(&mut self) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "  ⠿ thinking…");
        let _ = out.flush();
        self.thinking = true;
    }

    fn thinking_removed(&mut self) {
        if self.thinking {
            let mut out = std::io::stdout().lock();
            let _ = write!(out, "\x1b[1A\x1b[0J");
            let _ = out.flush();
            self.thinking = false;
        }
    }

    fn frame(&mut self, rendered: &str, done: bool) {
        let mut out = std::io::stdout().lock();
        self.clear_drawn(&mut out);
        for line in rendered.lines() {
            let _ = writeln!(out, "  {line}");
            self.lines_drawn += 1;
        }
        if done {
            self.lines_drawn = 0;
        }
        let _ = out.flush();
    }
}

// ── Minimal fallback formatter ────────────────────────────────────────────────

static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*(.*?)\*").unwrap());
static CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`(.*?)`").unwrap());
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(.*?)\]\((.*?)\)").unwrap());

/// Stateless raw-text → markup conversion: bold, italic, inline code, links,
/// then line breaks, in that fixed order. Not idempotent — it is applied
/// once per full source string, never to its own output.
pub fn simple_markdown(text: &str) -> String {
    let text = BOLD.replace_all(text, "<strong>$1</strong>");
    let text = ITALIC.replace_all(&text, "<em>$1</em>");
    let text = CODE.replace_all(&text, "<code>$1</code>");
    let text = LINK.replace_all(&text, r#"<a href="$2" target="_blank">$1</a>"#);
    text.replace('\n', "<br>")
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    pub struct CapturingSink {
        pub frames: Vec<(String, bool)>,
        pub thinking_events: Vec<&'static str>,
    }

    impl RevealSink for CapturingSink {
        fn thinking_shown(&mut self) {
            self.thinking_events.push("shown");
        }
        fn thinking_removed(&mut self) {
            self.thinking_events.push("removed");
        }
        fn frame(&mut self, rendered: &str, done: bool) {
            self.frames.push((rendered.to_string(), done));
        }
    }

    #[test]
    fn fallback_handles_the_five_constructs() {
        assert_eq!(simple_markdown("**b**"), "<strong>b</strong>");
        assert_eq!(simple_markdown("*i*"), "<em>i</em>");
        assert_eq!(simple_markdown("`c`"), "<code>c</code>");
        assert_eq!(
            simple_markdown("[t](http://u)"),
            r#"<a href="http://u" target="_blank">t</a>"#
        );
        assert_eq!(simple_markdown("a\nb"), "a<br>b");
    }

    #[test]
    fn fallback_applies_bold_before_italic() {
        // ** consumed by the bold pass first, leaving nothing for italic
        assert_eq!(
            simple_markdown("**bold** and *it*"),
            "<strong>bold</strong> and <em>it</em>"
        );
    }

    #[test]
    fn user_messages_render_as_literal_text() {
        let r = Renderer::new(MarkdownEngine::Minimal);
        assert_eq!(
            r.render_message(Role::User, "**no** <b>markup</b>"),
            "**no** &lt;b&gt;markup&lt;/b&gt;"
        );
    }

    #[test]
    fn assistant_messages_render_through_markdown() {
        let r = Renderer::new(MarkdownEngine::Minimal);
        assert_eq!(
            r.render_message(Role::Assistant, "**yes**"),
            "<strong>yes</strong>"
        );

        let full = Renderer::new(MarkdownEngine::Full);
        let html = full.render_message(Role::Assistant, "**yes**");
        assert!(html.contains("<strong>yes</strong>"), "got: {html}");
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_emits_one_frame_per_character_with_cursor() {
        let r = Renderer::new(MarkdownEngine::Minimal);
        let mut sink = CapturingSink::default();
        r.reveal("abc", &mut sink).await;

        assert_eq!(sink.frames.len(), 3);
        assert_eq!(sink.frames[0], (format!("a{CURSOR_MARKER}"), false));
        assert_eq!(sink.frames[1], (format!("ab{CURSOR_MARKER}"), false));
        // Final frame: full text, no cursor
        assert_eq!(sink.frames[2], ("abc".to_string(), true));
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_rerenders_the_growing_prefix_each_tick() {
        let r = Renderer::new(MarkdownEngine::Minimal);
        let mut sink = CapturingSink::default();
        r.reveal("**b**", &mut sink).await;

        // Mid-reveal, "**b*" parses as an empty italic pair plus leftovers
        assert_eq!(sink.frames[3].0, format!("<em></em>b*{CURSOR_MARKER}"));
        // The closing `*` flips the whole prefix to bold
        assert_eq!(sink.frames[4], ("<strong>b</strong>".to_string(), true));
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_of_empty_content_emits_single_done_frame() {
        let r = Renderer::new(MarkdownEngine::Minimal);
        let mut sink = CapturingSink::default();
        r.reveal("", &mut sink).await;
        assert_eq!(sink.frames, vec![(String::new(), true)]);
    }
}
