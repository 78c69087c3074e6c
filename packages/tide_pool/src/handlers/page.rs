use axum::response::Html;

/// The embedded terminal front end: a single self-contained page that renders
/// the byte stream with xterm.js and feeds keystrokes and viewport sizes back.
const TERMINAL_HTML: &str = include_str!("../../static/terminal.html");

pub async fn terminal_page() -> Html<&'static str> {
    Html(TERMINAL_HTML)
}
