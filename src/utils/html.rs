// ABOUTME: HTML escaping utilities to prevent XSS in server-rendered error pages
// ABOUTME: Renders the error page shown when a redirect target cannot be trusted
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use html_escape::encode_text;

/// Render a self-contained error page. Both values are escaped.
#[must_use]
pub fn render_error_page(error: &str, description: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Authorization error</title></head>\
         <body><h1>Authorization error</h1><p><code>{}</code></p><p>{}</p></body></html>\n",
        encode_text(error),
        encode_text(description)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_page_escapes_input() {
        let page = render_error_page("invalid_request", "<script>alert(1)</script>");
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
    }
}
