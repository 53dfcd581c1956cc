use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopLink {
    pub name: String,
    pub url: String,
}

/// Marketplace name, search page and the query parameter it expects.
const STORES: &[(&str, &str, &str)] = &[
    ("Lamoda", "https://www.lamoda.ru/catalogsearch/result/", "q"),
    ("Wildberries", "https://www.wildberries.ru/catalog/0/search.aspx", "search"),
    ("Ozon", "https://www.ozon.ru/search/", "text"),
];

// Marketplaces expect `%20` for spaces. Form encoding escapes a literal
// `+` as `%2B`, so every `+` it emits is a space.
fn search_url(base: &str, param: &str, query: &str) -> Option<String> {
    let mut url = Url::parse(base).ok()?;
    url.query_pairs_mut().append_pair(param, query);
    let encoded = url.query().map(|query| query.replace('+', "%20"));
    url.set_query(encoded.as_deref());
    Some(url.into())
}

pub fn shop_links(query: &str) -> Vec<ShopLink> {
    let query = query.trim();
    STORES
        .iter()
        .filter_map(|(name, base, param)| {
            search_url(base, param, query).map(|url| ShopLink {
                name: name.to_string(),
                url,
            })
        })
        .collect()
}
