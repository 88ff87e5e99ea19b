use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

/// Marker every product link carries.
const PRODUCT_PATH: &str = "/product/";

/// Listing-page link strategies, most specific first. Only the first one that
/// matches anything is used.
pub const STRATEGIES: &[&str] = &[
    r#".product-tile a[href*="/product/"]"#,
    r#".product-grid a[href*="/product/"]"#,
    r#".product-list a[href*="/product/"]"#,
    r#"a[href*="/product/"]"#,
];

#[derive(Debug)]
pub struct Extraction {
    /// Index into `STRATEGIES` of the strategy that matched.
    pub strategy: Option<usize>,
    pub urls: Vec<String>,
}

/// Product URLs from a category listing page, in document order, along with
/// the strategy that found them. Duplicates are kept.
pub fn extract_urls(html: &str, base_url: &str) -> Extraction {
    let doc = Html::parse_document(html);

    for (i, css) in STRATEGIES.iter().enumerate() {
        let Some(hrefs) = apply_strategy(&doc, css) else {
            continue;
        };
        let urls: Vec<String> = hrefs
            .iter()
            .filter(|h| h.contains(PRODUCT_PATH))
            .map(|h| absolutize(base_url, h))
            .collect();
        debug!("Strategy {} matched {} product URLs", i + 1, urls.len());
        return Extraction {
            strategy: Some(i),
            urls,
        };
    }

    debug!("No listing strategy matched");
    Extraction {
        strategy: None,
        urls: Vec::new(),
    }
}

/// Hrefs of every element the selector matches, or None when nothing matched.
fn apply_strategy(doc: &Html, css: &str) -> Option<Vec<String>> {
    let selector = Selector::parse(css).ok()?;
    let hrefs: Vec<String> = doc
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .map(|h| h.trim().to_string())
        .collect();
    if hrefs.is_empty() {
        None
    } else {
        Some(hrefs)
    }
}

fn absolutize(base_url: &str, href: &str) -> String {
    if href.starts_with("http") {
        return href.to_string();
    }
    Url::parse(base_url)
        .and_then(|base| base.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| format!("{}{}", base_url.trim_end_matches('/'), href))
}
