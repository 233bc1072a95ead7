use crate::detectors::utils::contains_term;
use crate::schema::ProductInfo;

/// A product the built-in lookup table knows about.
#[derive(Debug)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub brand: &'static str,
    pub category: &'static str,
    pub keywords: &'static [&'static str],
    pub barcode: Option<&'static str>,
    pub price: Option<&'static str>,
    pub description: &'static str,
}

pub static CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        name: "Coffee Beans",
        brand: "Morning Brew",
        category: "Groceries",
        keywords: &["coffee", "espresso", "roast", "beans", "arabica"],
        barcode: Some("5901234123457"),
        price: Some("$12.99"),
        description: "Whole bean dark roast coffee",
    },
    CatalogEntry {
        name: "Wireless Earbuds",
        brand: "AudioTech",
        category: "Electronics",
        keywords: &["earbuds", "headphones", "bluetooth", "wireless", "noise cancelling"],
        barcode: Some("042100005264"),
        price: Some("$79.99"),
        description: "Bluetooth earbuds with charging case",
    },
    CatalogEntry {
        name: "Moisturizing Cream",
        brand: "SkinCare",
        category: "Beauty",
        keywords: &["moisturizing", "moisturizer", "cream", "lotion", "spf", "hydrating"],
        barcode: None,
        price: Some("$18.50"),
        description: "Daily hydrating face cream",
    },
    CatalogEntry {
        name: "Plant Food",
        brand: "GreenThumb",
        category: "Home & Garden",
        keywords: &["plant food", "fertilizer", "garden", "houseplant", "soil"],
        barcode: None,
        price: Some("$9.99"),
        description: "All-purpose liquid plant food",
    },
    CatalogEntry {
        name: "Protein Powder",
        brand: "FitNutrition",
        category: "Health",
        keywords: &["protein", "whey", "supplement", "scoop", "shake"],
        barcode: None,
        price: Some("$34.99"),
        description: "Vanilla whey protein powder",
    },
];

impl CatalogEntry {
    pub fn brand_mentioned(&self, lower_text: &str) -> bool {
        contains_term(lower_text, &self.brand.to_lowercase())
    }

    pub fn name_mentioned(&self, lower_text: &str) -> bool {
        contains_term(lower_text, &self.name.to_lowercase())
    }

    pub fn keyword_hits(&self, lower_text: &str, labels: &[String]) -> usize {
        self.keywords
            .iter()
            .filter(|k| contains_term(lower_text, k) || labels.iter().any(|l| l == *k))
            .count()
    }

    pub fn to_info(&self) -> ProductInfo {
        ProductInfo {
            name: self.name.to_string(),
            brand: Some(self.brand.to_string()),
            category: Some(self.category.to_string()),
            price: self.price.map(String::from),
            barcode: self.barcode.map(String::from),
            description: Some(self.description.to_string()),
            attributes: Default::default(),
        }
    }
}

pub fn by_barcode(code: &str) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|e| e.barcode == Some(code))
}

/// Best catalog match for recognised text and labels.
///
/// An entry qualifies when its brand or name is mentioned, or at least two
/// of its keywords are.
pub fn best_match(lower_text: &str, labels: &[String]) -> Option<&'static CatalogEntry> {
    CATALOG
        .iter()
        .filter_map(|entry| {
            let named = entry.brand_mentioned(lower_text) || entry.name_mentioned(lower_text);
            let hits = entry.keyword_hits(lower_text, labels);
            let score = hits + if named { 2 } else { 0 };
            (named || hits >= 2).then_some((score, entry))
        })
        // max_by_key keeps the last maximum; reverse so earlier entries win ties
        .rev()
        .max_by_key(|(score, _)| *score)
        .map(|(_, entry)| entry)
}

/// Fallback record for a code the catalog does not know.
pub fn generated_info(code: &str) -> ProductInfo {
    let prefix: String = code.chars().take(4).collect();
    ProductInfo {
        name: format!("Product {prefix}"),
        barcode: Some(code.to_string()),
        ..Default::default()
    }
}
