//! Plain-text summaries from rendered HTML.

use quick_xml::events::Event;

/// Text of the first `<p>` element in `html`.
///
/// Each text node inside the paragraph is trimmed, empty nodes are dropped,
/// and the rest are joined with single spaces. HTML5 named entities such as
/// `&nbsp;` are decoded; an unknown entity leaves its text node raw. Returns an empty string when
/// there is no paragraph or the markup cannot be tokenized; this never fails.
pub fn summarize(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let mut reader = quick_xml::Reader::from_str(html);
    let config = reader.config_mut();
    config.trim_text(true);
    config.check_end_names = false;
    config.check_comments = false;
    config.allow_unmatched_ends = true;

    let mut strings: Vec<String> = Vec::new();
    let mut in_paragraph = false;
    // Depth of nested <p> inside the first one, so an inner </p> does not end it.
    let mut depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if is_paragraph(e.name().as_ref()) => {
                if in_paragraph {
                    depth += 1;
                } else {
                    in_paragraph = true;
                }
            }
            Ok(Event::Empty(e)) if !in_paragraph && is_paragraph(e.name().as_ref()) => {
                return String::new();
            }
            Ok(Event::End(e)) if in_paragraph && is_paragraph(e.name().as_ref()) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            Ok(Event::Text(t)) if in_paragraph => {
                let text = t
                    .unescape()
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                push_stripped(&mut strings, &text);
            }
            Ok(Event::CData(t)) if in_paragraph => {
                push_stripped(&mut strings, &String::from_utf8_lossy(&t));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "could not parse html for summary");
                return String::new();
            }
        }
    }

    strings.join(" ")
}

fn is_paragraph(name: &[u8]) -> bool {
    name.eq_ignore_ascii_case(b"p")
}

fn push_stripped(strings: &mut Vec<String>, text: &str) {
    let stripped = text.trim();
    if !stripped.is_empty() {
        strings.push(stripped.to_string());
    }
}
