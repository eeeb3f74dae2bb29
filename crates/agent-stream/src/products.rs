//! Extraction of the `<products>` block embedded in answer text.

use serde_json::Value;
use tracing::debug;

use crate::model::ProductCard;

pub const PRODUCTS_OPEN: &str = "<products>";
pub const PRODUCTS_CLOSE: &str = "</products>";

/// Answer text split into its visible part and any product list it carried.
#[derive(Clone, Debug, PartialEq)]
pub struct ProductExtraction {
    pub display_text: String,
    pub products: Option<Vec<ProductCard>>,
}

/// Strips the product block out of `raw` and parses it.
///
/// - no opening marker: text unchanged, no products
/// - opening marker only: text cut before the marker (the block is still
///   streaming), no products
/// - both markers: region removed from the text; the JSON between them is
///   read as `{"products": [...]}` or a bare array. Other shapes and parse
///   failures produce no products.
pub fn extract_products(raw: &str) -> ProductExtraction {
    let Some(open) = raw.find(PRODUCTS_OPEN) else {
        return ProductExtraction {
            display_text: raw.to_string(),
            products: None,
        };
    };
    let body_start = open + PRODUCTS_OPEN.len();
    let Some(close) = raw[body_start..].find(PRODUCTS_CLOSE).map(|i| body_start + i) else {
        return ProductExtraction {
            display_text: raw[..open].trim_end().to_string(),
            products: None,
        };
    };

    let products = parse_product_block(raw[body_start..close].trim());
    let mut display = String::with_capacity(raw.len());
    display.push_str(&raw[..open]);
    display.push_str(&raw[close + PRODUCTS_CLOSE.len()..]);
    ProductExtraction {
        display_text: display.trim().to_string(),
        products,
    }
}

fn parse_product_block(json_text: &str) -> Option<Vec<ProductCard>> {
    let parsed: Value = match serde_json::from_str(json_text) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, "product block is not valid json");
            return None;
        }
    };
    let items = match &parsed {
        Value::Object(obj) => obj.get("products")?.as_array()?,
        Value::Array(items) => items,
        _ => return None,
    };
    Some(
        items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_products_and_strips_region() {
        let out = extract_products(
            r#"hello <products>{"products":[{"title":"X"}]}</products> world"#,
        );
        assert_eq!(out.display_text, "hello  world");
        let products = out.products.expect("products");
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].title, "X");
    }

    #[test]
    fn text_without_marker_is_unchanged() {
        let out = extract_products("  just text  ");
        assert_eq!(out.display_text, "  just text  ");
        assert_eq!(out.products, None);
    }

    #[test]
    fn unterminated_block_truncates_text() {
        let out = extract_products("Here you go:\n<products>{\"products\":[{\"ti");
        assert_eq!(out.display_text, "Here you go:");
        assert_eq!(out.products, None);
    }

    #[test]
    fn bare_array_is_accepted() {
        let out = extract_products(r#"<products>[{"title":"A","price":12.5},{"title":"B"}]</products>"#);
        assert_eq!(out.display_text, "");
        let titles: Vec<String> = out
            .products
            .expect("products")
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[test]
    fn invalid_block_is_still_stripped() {
        let out = extract_products("before <products>{oops</products> after");
        assert_eq!(out.display_text, "before  after");
        assert_eq!(out.products, None);

        let out = extract_products(r#"a <products>{"items":[]}</products>"#);
        assert_eq!(out.display_text, "a");
        assert_eq!(out.products, None);
    }

    #[test]
    fn malformed_entries_are_skipped_individually() {
        let out = extract_products(r#"<products>[{"title":"ok"},{"price":3},"junk"]</products>"#);
        let products = out.products.expect("products");
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].title, "ok");
    }
}
