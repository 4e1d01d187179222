//! Product Catalog
//!
//! Static in-process catalog; the storefront sells a fixed set of
//! downloadable products. Price and access tier are resolved server-side
//! so checkout never trusts client-supplied amounts.

use serde::Serialize;

/// One purchasable product
#[derive(Clone, Debug, Serialize)]
pub struct Product {
    pub id: u32,
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,

    /// Price in USD cents
    pub price_cents: i64,

    pub version: &'static str,
    pub rating: f32,
    pub features: &'static [&'static str],
    pub tags: &'static [&'static str],

    /// Access tier minted for this product's licenses
    pub access_level: &'static str,
}

static CATALOG: [Product; 2] = [
    Product {
        id: 1,
        name: "GlideNote",
        category: "Productivity",
        description: "Floating note-taking app that overlays on top of any application, \
                      with automatic formatting and cloud sync.",
        price_cents: 499,
        version: "1.5.0",
        rating: 4.9,
        features: &[
            "Floating note interface",
            "Automatic note formatting",
            "Windows and macOS support",
            "Cloud sync",
            "Offline mode",
            "Export to multiple formats",
        ],
        tags: &["Productivity", "Note-Taking", "Standard"],
        access_level: "1",
    },
    Product {
        id: 2,
        name: "PixelVault",
        category: "Utilities",
        description: "Screenshot capture and organization tool with searchable history, \
                      annotations, and shareable links.",
        price_cents: 999,
        version: "2.1.3",
        rating: 4.7,
        features: &[
            "Region and window capture",
            "Searchable screenshot history",
            "Annotations and redaction",
            "Shareable links",
            "Windows and macOS support",
        ],
        tags: &["Utilities", "Capture", "Pro"],
        access_level: "2",
    },
];

/// All products, in listing order
pub fn products() -> &'static [Product] {
    &CATALOG
}

/// Look up a product by id
pub fn find(id: u32) -> Option<&'static Product> {
    CATALOG.iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_existing_product() {
        let product = find(1).expect("product 1 exists");
        assert_eq!(product.name, "GlideNote");
        assert_eq!(product.access_level, "1");
    }

    #[test]
    fn test_find_unknown_product() {
        assert!(find(999).is_none());
    }

    #[test]
    fn test_product_ids_are_unique() {
        let mut ids: Vec<u32> = products().iter().map(|p| p.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), products().len());
    }
}
