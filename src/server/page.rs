//! HTML for the `tricolor` view.

use crate::pipeline::RenderedView;

/// Escape text for use in HTML content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Percent-encode text for use as a URL query value.
///
/// Unreserved characters and `/` are kept, everything else is encoded byte
/// by byte.
pub fn encode_query_value(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                out.push(char::from(byte));
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

/// The dashboard page: file selector, echogram with axis labels, legend and notices.
///
/// `files` are dataset paths relative to the data root; `selected` is the
/// entry to mark as current, and the image is requested for that file so the
/// page never shows another client's selection. `version` busts the
/// browser's image cache.
pub fn tricolor_page(view: &RenderedView, files: &[String], selected: &str, version: u64) -> String {
    let options: String = files
        .iter()
        .map(|file| {
            let mark = if file == selected { " selected" } else { "" };
            format!(
                r#"<option value="{0}"{1}>{0}</option>"#,
                escape_html(file),
                mark
            )
        })
        .collect();

    let legend: String = view
        .layers
        .iter()
        .map(|layer| {
            format!(
                r#"<li><span class="swatch" style="border-color:{}"></span>{} regions ({})</li>"#,
                escape_html(&layer.color),
                layer.source,
                layer.regions
            )
        })
        .collect();

    let notices: String = view
        .notices
        .iter()
        .map(|notice| format!("<li>{}</li>", escape_html(notice)))
        .collect();

    let (start, end) = view
        .time_range
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .unwrap_or_default();
    let width = view.composite.base.width();
    let height = view.composite.base.height();
    let title = escape_html(&view.title);
    let image_file = escape_html(&encode_query_value(selected));

    format!(
        r##"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{title}</title>
    <style>
      body {{ font-family: sans-serif; margin: 1.5rem; }}
      .plot {{ display: grid; grid-template-columns: 2rem auto; align-items: center; }}
      .ylabel {{ writing-mode: vertical-rl; transform: rotate(180deg); text-align: center; }}
      .xlabel {{ grid-column: 2; text-align: center; }}
      .range {{ grid-column: 2; display: flex; justify-content: space-between; font-size: 0.8rem; color: #555; }}
      .swatch {{ display: inline-block; width: 1.5rem; border-top: 3px solid; margin-right: 0.5rem; vertical-align: middle; }}
      ul {{ list-style: none; padding-left: 0; }}
      .notices li {{ color: #a15c00; }}
    </style>
  </head>
  <body>
    <form method="get" action="/tricolor">
      <label for="file">Dataset</label>
      <select id="file" name="file" onchange="this.form.submit()">{options}</select>
      <noscript><button type="submit">Show</button></noscript>
    </form>
    <h2>{title}</h2>
    <div class="plot">
      <div class="ylabel">depth</div>
      <img src="/tricolor/image.png?file={image_file}&amp;v={version}" width="{width}" height="{height}" alt="{title}" />
      <div class="range"><span>{start}</span><span>{end}</span></div>
      <div class="xlabel">Time</div>
    </div>
    <ul class="legend">{legend}</ul>
    <ul class="notices">{notices}</ul>
  </body>
</html>
"##
    )
}

/// Minimal page reporting a failed selection.
pub fn error_page(selected: &str, message: &str) -> String {
    format!(
        r##"<!doctype html>
<html lang="en">
  <head><meta charset="utf-8" /><title>echodash: error</title></head>
  <body>
    <h2>Cannot show {}</h2>
    <pre>{}</pre>
    <p><a href="/tricolor">Back to the current dataset</a></p>
  </body>
</html>
"##,
        escape_html(selected),
        escape_html(message)
    )
}
