use crate::generation::job::OutfitItem;

/// Only this many recommended items make it into the instruction.
pub const MAX_PROMPT_ITEMS: usize = 5;

pub fn clothing_list(items: &[OutfitItem]) -> Vec<String> {
    items
        .iter()
        .take(MAX_PROMPT_ITEMS)
        .map(|item| format!("{} ({})", item.name.trim(), item.description.trim()))
        .collect()
}

pub fn build_outfit_prompt(items: &[OutfitItem], style: &str) -> String {
    let clothing = clothing_list(items).join(", ");
    format!(
        "Change the person's clothing to exactly these items: {clothing}.\n\
         Keep the person's face, body shape, skin tone, hair, and overall identity completely unchanged.\n\
         Only modify the clothing items to match the specified outfit.\n\
         Style: {}.\n\
         Maintain photorealistic quality and natural lighting.",
        style.trim()
    )
}
