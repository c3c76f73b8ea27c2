//! Parsing of RFC 8288 style `Link` response headers as sent by the Canvas API:
//!
//! ```text
//! <https://host/api/v1/users/1/page_views?page=2&per_page=10>; rel="next",
//! <https://host/api/v1/users/1/page_views?page=1&per_page=10>; rel="first"
//! ```

/// Returns the URL of the segment whose `rel` is `next`, if any.
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|segment| {
        let mut parts = segment.split(';');
        let target = parts.next()?.trim();
        let url = target.strip_prefix('<')?.strip_suffix('>')?.trim();

        let is_next = parts.any(|param| {
            let Some((key, value)) = param.split_once('=') else {
                return false;
            };
            key.trim().eq_ignore_ascii_case("rel")
                && value
                    .trim()
                    .trim_matches(|c| c == '"' || c == '\'')
                    .split_whitespace()
                    .any(|rel| rel == "next")
        });

        (is_next && !url.is_empty()).then(|| url.to_string())
    })
}
