//! The vision step's answer, as the service returns it to clients.

use serde::{Deserialize, Serialize};

use crate::catalog::{shop_links, ShopLink};
use crate::generation::OutfitItem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(default)]
    pub item: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub why: String,
    #[serde(default)]
    pub search_query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shop_links: Vec<ShopLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutfitAnalysis {
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub person_description: String,
    #[serde(default)]
    pub outfit_description: String,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub style_tips: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_image: Option<String>,
}

impl OutfitAnalysis {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn outfit_items(&self) -> Vec<OutfitItem> {
        self.recommendations
            .iter()
            .map(|rec| OutfitItem::new(rec.item.clone(), rec.description.clone()))
            .collect()
    }

    pub fn attach_shop_links(&mut self) {
        for rec in &mut self.recommendations {
            rec.shop_links = shop_links(&rec.search_query);
        }
    }

    pub fn with_generated_image(mut self, url: Option<String>) -> Self {
        self.generated_image = url;
        self
    }
}

/// Envelope returned to the web client.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResponse {
    pub success: bool,
    pub data: OutfitAnalysis,
}

impl From<OutfitAnalysis> for AnalysisResponse {
    fn from(data: OutfitAnalysis) -> Self {
        AnalysisResponse {
            success: true,
            data,
        }
    }
}
