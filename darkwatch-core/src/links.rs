//! Same-site hidden service link extraction for deep scans

use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

use crate::ONION_SUFFIX;

static HREF_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[href]").unwrap());

/// Resolve one raw `href` value against `base`
fn resolve_href(base: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();

    if raw.is_empty()
        || raw.starts_with('#')
        || raw.starts_with("javascript:")
        || raw.starts_with("mailto:")
    {
        return None;
    }

    if raw.starts_with("http") {
        Some(raw.to_string())
    } else if raw.starts_with("//") {
        Some(format!("{}:{}", base.scheme(), raw))
    } else {
        base.join(raw).ok().map(|u| u.to_string())
    }
}

fn same_host(candidate: &str, base: &Url) -> bool {
    match (Url::parse(candidate), base.host_str()) {
        (Ok(url), Some(base_host)) => url
            .host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case(base_host)),
        _ => false,
    }
}

/// Extract absolute links from `html` that stay on `base_url`'s hidden service.
///
/// Results keep first-seen order, are unique, and never include `base_url`.
pub fn extract_links(html: &str, base_url: &str) -> Vec<String> {
    let base = match Url::parse(base_url) {
        Ok(base) => base,
        Err(e) => {
            debug!("Cannot extract links, bad base URL {}: {}", base_url, e);
            return Vec::new();
        }
    };

    let document = Html::parse_document(html);
    let mut seen: HashSet<String> = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&HREF_SELECTOR) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(full) = resolve_href(&base, href) else {
            continue;
        };

        if !full.contains(ONION_SUFFIX) || !same_host(&full, &base) {
            continue;
        }
        if full == base_url || full == base.as_str() {
            continue;
        }
        if seen.insert(full.clone()) {
            links.push(full);
        }
    }

    debug!("Extracted {} same-site links from {}", links.len(), base_url);
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://abcdefghijklmnop.onion/";

    #[test]
    fn test_resolves_relative_and_absolute() {
        let html = r#"
            <html><body>
                <a href="/market">Market</a>
                <a href="forum/index.php">Forum</a>
                <a href="http://abcdefghijklmnop.onion/contact">Contact</a>
                <a href="//abcdefghijklmnop.onion/rules">Rules</a>
            </body></html>
        "#;

        let links = extract_links(html, BASE);
        assert_eq!(
            links,
            vec![
                "http://abcdefghijklmnop.onion/market".to_string(),
                "http://abcdefghijklmnop.onion/forum/index.php".to_string(),
                "http://abcdefghijklmnop.onion/contact".to_string(),
                "http://abcdefghijklmnop.onion/rules".to_string(),
            ]
        );
    }

    #[test]
    fn test_skips_fragments_scripts_and_mail() {
        let html = r##"
            <a href="#top">Top</a>
            <a href="javascript:void(0)">JS</a>
            <a href="mailto:admin@abcdefghijklmnop.onion">Mail</a>
            <a href="   ">Blank</a>
            <a href="/ok">Ok</a>
        "##;

        let links = extract_links(html, BASE);
        assert_eq!(links, vec!["http://abcdefghijklmnop.onion/ok".to_string()]);
        assert!(links.iter().all(|l| !l.starts_with('#')
            && !l.starts_with("javascript:")
            && !l.starts_with("mailto:")));
    }

    #[test]
    fn test_excludes_other_hosts_and_clearnet() {
        let html = r#"
            <a href="http://zyxwvutsrqponmlk.onion/page">Other onion</a>
            <a href="https://example.com/page">Clearnet</a>
            <a href="/same">Same</a>
        "#;

        let links = extract_links(html, BASE);
        assert_eq!(links, vec!["http://abcdefghijklmnop.onion/same".to_string()]);
    }

    #[test]
    fn test_excludes_base_and_duplicates() {
        let html = r#"
            <a href="/">Home</a>
            <a href="http://abcdefghijklmnop.onion/">Home again</a>
            <a href="/a">A</a>
            <a href="/a">A again</a>
            <link rel="stylesheet" href="/style.css">
        "#;

        let links = extract_links(html, BASE);
        assert_eq!(
            links,
            vec![
                "http://abcdefghijklmnop.onion/a".to_string(),
                "http://abcdefghijklmnop.onion/style.css".to_string(),
            ]
        );
        assert!(!links.contains(&BASE.to_string()));
    }

    #[test]
    fn test_clearnet_base_yields_nothing() {
        let html = r#"<a href="/page">Page</a>"#;
        assert!(extract_links(html, "https://example.com/").is_empty());
    }

    #[test]
    fn test_invalid_base() {
        assert!(extract_links("<a href='/x'>x</a>", "not a url").is_empty());
    }
}
