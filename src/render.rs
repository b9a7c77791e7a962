use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};

/// Renders turn content as HTML. Raw HTML in the source is shown as text, never
/// passed through, and link or image targets with an unsafe scheme become `#`.
pub fn markdown_to_html(source: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let events = Parser::new_ext(source, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link { link_type, dest_url, title, id }) => Event::Start(Tag::Link {
            link_type,
            dest_url: safe_destination(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image { link_type, dest_url, title, id }) => Event::Start(Tag::Image {
            link_type,
            dest_url: safe_destination(dest_url),
            title,
            id,
        }),
        other => other,
    });

    let mut out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

const ALLOWED_SCHEMES: [&str; 3] = ["http", "https", "mailto"];

/// Keeps relative targets and the allowed schemes; anything else becomes `#`.
fn safe_destination(dest: CowStr<'_>) -> CowStr<'_> {
    // Browsers drop tabs and newlines inside schemes, so do the same before checking.
    let cleaned: String = dest
        .trim()
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .collect();
    let scheme_end = cleaned.find(|c: char| matches!(c, ':' | '/' | '?' | '#'));
    match scheme_end {
        Some(i) if cleaned[i..].starts_with(':') => {
            let scheme = cleaned[..i].to_ascii_lowercase();
            if ALLOWED_SCHEMES.contains(&scheme.as_str()) {
                dest
            } else {
                CowStr::Borrowed("#")
            }
        }
        _ => dest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_basic_markdown() {
        let out = markdown_to_html("**Step 1:** HTML\n\n- CSS\n- JS");
        assert!(out.contains("<strong>Step 1:</strong>"));
        assert!(out.contains("<li>CSS</li>"));
    }

    #[test]
    fn test_raw_html_is_escaped() {
        let out = markdown_to_html("hi <script>alert(1)</script>");
        assert!(!out.contains("<script>"));
        assert!(out.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_script_links_are_neutralized() {
        let out = markdown_to_html("[click](javascript:alert(document.domain))");
        assert!(!out.contains("javascript:"));
        assert!(out.contains(r##"<a href="#">click</a>"##));

        let out = markdown_to_html("[x](JaVaScript:alert(1)) ![img](data:text/html;base64,AAAA)");
        assert!(!out.to_ascii_lowercase().contains("script:"));
        assert!(!out.contains("data:"));
    }

    #[test]
    fn test_safe_links_are_kept() {
        let out = markdown_to_html(
            "[docs](https://react.dev/learn) [mail](mailto:hi@example.com) [rel](/static/style.css) [frag](#top)",
        );
        assert!(out.contains(r#"href="https://react.dev/learn""#));
        assert!(out.contains(r#"href="mailto:hi@example.com""#));
        assert!(out.contains(r#"href="/static/style.css""#));
        assert!(out.contains(r##"href="#top""##));
    }

    #[test]
    fn test_inline_code_keeps_error_detail() {
        let out = markdown_to_html("`HTTP 401: bad key`");
        assert!(out.contains("<code>HTTP 401: bad key</code>"));
    }
}
