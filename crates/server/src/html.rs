//! Server-rendered HTML building blocks.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use std::fmt::Write;

/// Escape text for HTML element content and quoted attribute values.
pub fn escape(text: &str) -> String {
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

/// Escaped text, or "None" for missing values.
pub fn text_or_none(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => escape(v),
        _ => "None".to_string(),
    }
}

const NAV: &[(&str, &str)] = &[
    ("/app", "Getting started"),
    ("/app/phenotypes", "Phenotypes"),
    ("/app/traits", "Traits"),
    ("/app/timeline", "Timeline"),
    ("/app/genes", "Genes"),
    ("/app/translation", "Translation"),
    ("/app/expression", "Expression"),
    ("/app/pipelines", "Pipelines"),
    ("/app/software", "Software"),
];

/// Full document around `body`. App pages get the navigation bar.
pub fn page(title: &str, body: &str, with_nav: bool) -> String {
    let mut nav = String::new();
    if with_nav {
        nav.push_str("<nav>");
        for (href, label) in NAV {
            let _ = write!(nav, r#"<a href="{href}">{label}</a> "#);
        }
        nav.push_str(
            r#"<form method="post" action="/logout" style="display:inline"><button type="submit">Sign out</button></form></nav>"#,
        );
    }

    format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} | Bloom</title>
</head>
<body>
{nav}
<main>
<h1>{title}</h1>
{body}
</main>
</body>
</html>"#,
        title = escape(title),
    )
}

/// App page with navigation.
pub fn app_page(title: &str, body: &str) -> Response {
    Html(page(title, body, true)).into_response()
}

/// 404 page.
pub fn not_found(what: &str) -> Response {
    let body = format!("<p>Not found: {}</p>", escape(what));
    (StatusCode::NOT_FOUND, Html(page("Not found", &body, true))).into_response()
}

/// Table with escaped headers; cells are inserted as given.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut out = String::from("<table>\n<thead><tr>");
    for header in headers {
        let _ = write!(out, "<th>{}</th>", escape(header));
    }
    out.push_str("</tr></thead>\n<tbody>\n");
    for row in rows {
        out.push_str("<tr>");
        for cell in row {
            let _ = write!(out, "<td>{cell}</td>");
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>");
    out
}

/// Link with escaped href and label.
pub fn link(href: &str, label: &str) -> String {
    format!(r#"<a href="{}">{}</a>"#, escape(href), escape(label))
}

/// Thumbnail image.
pub fn img(src: &str, alt: &str, width: u32) -> String {
    format!(
        r#"<img src="{}" alt="{}" width="{width}" loading="lazy">"#,
        escape(src),
        escape(alt)
    )
}
