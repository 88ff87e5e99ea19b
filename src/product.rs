use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

/// Selector text per product field. Within a field, the first match wins.
struct FieldCss {
    name: &'static str,
    price: &'static str,
    description: &'static str,
    benefits: &'static str,
    ingredients: &'static str,
    id: &'static str,
}

const PRODUCT_CSS: FieldCss = FieldCss {
    name: ".product-name, .product-title, h1",
    price: ".product-price, .price-sales, .price",
    description: ".product-description, .description, .product-details",
    benefits: ".benefits li, .product-benefits li, .key-benefits li",
    ingredients: ".ingredients, .ingredient-list",
    id: "[data-product-id], [data-sku]",
};

struct FieldSelectors {
    name: Selector,
    price: Selector,
    description: Selector,
    benefits: Selector,
    ingredients: Selector,
    id: Selector,
}

impl FieldSelectors {
    fn compile(css: &FieldCss) -> Result<Self, String> {
        Ok(Self {
            name: selector(css.name)?,
            price: selector(css.price)?,
            description: selector(css.description)?,
            benefits: selector(css.benefits)?,
            ingredients: selector(css.ingredients)?,
            id: selector(css.id)?,
        })
    }
}

/// Compiled once; a bad selector turns every parse into `ParseOutcome::Failed`.
static PRODUCT_SELECTORS: LazyLock<Result<FieldSelectors, String>> =
    LazyLock::new(|| FieldSelectors::compile(&PRODUCT_CSS));

/// Prefix for identifiers derived from page content rather than read from markup.
pub const SYNTHETIC_ID_PREFIX: &str = "NSK-";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductRecord {
    /// Identifier read from the page, if it had one.
    pub id: Option<String>,
    pub name: Option<String>,
    /// Digits and decimal point only, e.g. "24.99".
    pub price: Option<String>,
    pub description: Option<String>,
    pub benefits: Vec<String>,
    pub ingredients: Option<String>,
    pub category: String,
    pub url: Option<String>,
}

impl ProductRecord {
    pub fn empty(category: &str) -> Self {
        Self {
            category: category.to_string(),
            ..Default::default()
        }
    }

    /// True when at least one product field was found on the page.
    pub fn has_content(&self) -> bool {
        self.id.is_some()
            || self.name.is_some()
            || self.price.is_some()
            || self.description.is_some()
            || !self.benefits.is_empty()
            || self.ingredients.is_some()
    }

    /// Source URL is attached once, after parsing.
    pub fn with_url(mut self, url: &str) -> Self {
        if self.url.is_none() {
            self.url = Some(url.to_string());
        }
        self
    }

    /// Explicit identifier, or one derived from name, category and URL.
    pub fn product_id(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => synthetic_id(
                self.name.as_deref().unwrap_or(""),
                &self.category,
                self.url.as_deref().unwrap_or(""),
            ),
        }
    }
}

/// Stable identifier for products whose page carries none. Same inputs always
/// give the same id, so re-scrapes line up.
pub fn synthetic_id(name: &str, category: &str, url: &str) -> String {
    let mut h = Sha256::new();
    h.update(name.as_bytes());
    h.update(b"|");
    h.update(category.as_bytes());
    h.update(b"|");
    h.update(url.as_bytes());
    let digest = h.finalize();
    let hex: String = digest.iter().take(5).map(|b| format!("{:02x}", b)).collect();
    format!("{}{}", SYNTHETIC_ID_PREFIX, hex)
}

/// Keep ASCII digits and '.'; "$24.99 USD" -> "24.99". Idempotent.
pub fn normalize_price(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Product(ProductRecord),
    /// Page parsed fine but none of the product fields were present.
    NothingFound,
    /// The field selectors failed to compile. No markup can cause this; it
    /// keeps a broken rule table an explicit outcome rather than a panic.
    Failed(String),
}

/// Parse a product page. Never panics on bad markup; missing fields are left out.
pub fn parse(html: &str, category: &str) -> ParseOutcome {
    parse_with(&PRODUCT_SELECTORS, html, category)
}

fn parse_with(
    selectors: &Result<FieldSelectors, String>,
    html: &str,
    category: &str,
) -> ParseOutcome {
    let sel = match selectors {
        Ok(sel) => sel,
        Err(reason) => {
            warn!("Error parsing product: {}", reason);
            return ParseOutcome::Failed(reason.clone());
        }
    };

    let record = extract_fields(sel, &Html::parse_document(html), category);
    if record.has_content() {
        info!(
            "Parsed product: {}",
            record.name.as_deref().unwrap_or("Unknown")
        );
        ParseOutcome::Product(record)
    } else {
        debug!("No product fields found");
        ParseOutcome::NothingFound
    }
}

fn extract_fields(sel: &FieldSelectors, doc: &Html, category: &str) -> ProductRecord {
    let id = doc.select(&sel.id).next().and_then(|el| {
        let v = el.value();
        v.attr("data-product-id")
            .or_else(|| v.attr("data-sku"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    });

    ProductRecord {
        id,
        name: first_text(doc, &sel.name),
        price: first_text(doc, &sel.price)
            .map(|t| normalize_price(&t))
            .filter(|p| !p.is_empty()),
        description: first_text(doc, &sel.description),
        benefits: all_text(doc, &sel.benefits),
        ingredients: first_text(doc, &sel.ingredients),
        ..ProductRecord::empty(category)
    }
}

fn selector(css: &str) -> Result<Selector, String> {
    Selector::parse(css).map_err(|e| format!("bad selector {:?}: {}", css, e))
}

fn first_text(doc: &Html, sel: &Selector) -> Option<String> {
    doc.select(sel).map(element_text).find(|t| !t.is_empty())
}

fn all_text(doc: &Html, sel: &Selector) -> Vec<String> {
    doc.select(sel)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect()
}

fn element_text(el: ElementRef<'_>) -> String {
    normalize_text(&el.text().collect::<Vec<_>>().join(" "))
}

fn normalize_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="product" data-sku="01003610">
            <h1 class="product-title">ageLOC  LumiSpa
               Treatment Cleanser</h1>
            <span class="price-sales">$24.99 USD</span>
            <div class="product-description">Gentle daily cleanser.</div>
            <ul class="key-benefits">
              <li>Reduces wrinkles</li>
              <li> Smooths skin </li>
              <li>   </li>
            </ul>
            <div class="ingredient-list">Water, Glycerin</div>
          </div>
        </body></html>
    "#;

    #[test]
    fn full_product_page() {
        let record = match parse(PAGE, "/us/en/catalog/tru_face") {
            ParseOutcome::Product(r) => r,
            other => panic!("unexpected: {:?}", other),
        };
        assert_eq!(record.id.as_deref(), Some("01003610"));
        assert_eq!(record.name.as_deref(), Some("ageLOC LumiSpa Treatment Cleanser"));
        assert_eq!(record.price.as_deref(), Some("24.99"));
        assert_eq!(record.description.as_deref(), Some("Gentle daily cleanser."));
        assert_eq!(record.benefits, vec!["Reduces wrinkles", "Smooths skin"]);
        assert_eq!(record.ingredients.as_deref(), Some("Water, Glycerin"));
        assert_eq!(record.category, "/us/en/catalog/tru_face");
        assert_eq!(record.product_id(), "01003610");
    }

    #[test]
    fn product_id_attribute_preferred_over_sku() {
        let html = r#"<div data-product-id="P-1" data-sku="S-1"><h1>X</h1></div>"#;
        let ParseOutcome::Product(record) = parse(html, "c") else {
            panic!("expected a product");
        };
        assert_eq!(record.id.as_deref(), Some("P-1"));
    }

    #[test]
    fn price_normalization_is_idempotent() {
        let once = normalize_price("$24.99 USD");
        assert_eq!(once, "24.99");
        assert_eq!(normalize_price(&once), once);
        assert_eq!(normalize_price("1,299.00 €"), "1299.00");
        assert_eq!(normalize_price("call us"), "");
    }

    #[test]
    fn empty_and_malformed_markup() {
        for html in ["", "<html></html>", "<div><span class='price'>", "<<<>>>&&&"] {
            assert_eq!(parse(html, "hair"), ParseOutcome::NothingFound, "input: {:?}", html);

            let sel = PRODUCT_SELECTORS.as_ref().unwrap();
            let record = extract_fields(sel, &Html::parse_document(html), "hair");
            assert_eq!(record, ProductRecord::empty("hair"));
            assert!(!record.has_content());
        }
    }

    #[test]
    fn broken_selector_table_fails_every_page() {
        let table = FieldSelectors::compile(&FieldCss {
            price: ".price[",
            ..PRODUCT_CSS
        });
        let outcome = parse_with(&table, PAGE, "c");
        match outcome {
            ParseOutcome::Failed(reason) => assert!(reason.contains(".price["), "{}", reason),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(parse(PAGE, "c"), ParseOutcome::Product(_)));
    }

    #[test]
    fn digitless_price_is_dropped() {
        let html = r#"<h1>Gift card</h1><span class="price">Call for price</span>"#;
        let ParseOutcome::Product(record) = parse(html, "c") else {
            panic!("expected a product");
        };
        assert!(record.price.is_none());
    }

    #[test]
    fn first_non_empty_match_wins() {
        let html = r#"<div class="product-name">  </div><h1>Real Name</h1>"#;
        let ParseOutcome::Product(record) = parse(html, "c") else {
            panic!("expected a product");
        };
        assert_eq!(record.name.as_deref(), Some("Real Name"));
    }

    #[test]
    fn partial_page_keeps_what_it_found() {
        let ParseOutcome::Product(record) = parse("<h1>Only a name</h1>", "c") else {
            panic!("expected a product");
        };
        assert_eq!(record.name.as_deref(), Some("Only a name"));
        assert!(record.price.is_none());
        assert!(record.benefits.is_empty());
        assert!(record.id.is_none());
    }

    #[test]
    fn synthetic_id_is_stable() {
        let a = ProductRecord {
            name: Some("Serum".into()),
            category: "anti-aging".into(),
            ..Default::default()
        }
        .with_url("https://www.nuskin.com/product/serum");
        let b = a.clone();
        assert_eq!(a.product_id(), b.product_id());
        assert!(a.product_id().starts_with(SYNTHETIC_ID_PREFIX));
        assert_eq!(a.product_id().len(), SYNTHETIC_ID_PREFIX.len() + 10);

        let other = a.clone().with_url("ignored");
        assert_eq!(other.url, a.url);
        let moved = ProductRecord {
            url: Some("https://www.nuskin.com/product/other".into()),
            ..a.clone()
        };
        assert_ne!(moved.product_id(), a.product_id());
    }
}
