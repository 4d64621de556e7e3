//! Recipe-suggestion helpers for the presentation layer.
//!
//! The suggestion service itself is an external collaborator. This module
//! only builds its prompt from display names and makes a best-effort pass
//! over whatever text comes back; nothing here feeds consolidation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static FENCED_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("valid fenced block regex")
});

const SUGGESTION_COUNT: usize = 3;
const FALLBACK_TITLE: &str = "AI Response";
const EMPTY_PANTRY_TITLE: &str = "Add pantry items first";

/// One suggested recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub title: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub instructions: String,
}

impl Recipe {
    fn text_only(title: &str, instructions: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            ingredients: Vec::new(),
            instructions: instructions.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SuggestionPayload {
    List(Vec<Recipe>),
    Wrapped { recipes: Vec<Recipe> },
}

/// Builds the suggestion prompt, or `None` for an empty pantry.
pub fn recipe_prompt(display_names: &[String]) -> Option<String> {
    if display_names.is_empty() {
        return None;
    }
    Some(format!(
        "I have the following ingredients: {}. Suggest {SUGGESTION_COUNT} easy recipes I can make with them. \
         Return output as JSON array with \"title\", \"ingredients\", and \"instructions\".",
        display_names.join(", ")
    ))
}

/// Placeholder shown instead of calling the collaborator with no items.
pub fn empty_pantry_recipes() -> Vec<Recipe> {
    vec![Recipe::text_only(EMPTY_PANTRY_TITLE, "")]
}

/// Parses suggestion text into recipes.
///
/// Accepts a JSON array, an object with a `recipes` array, or either inside
/// a fenced code block. Anything else becomes one recipe holding the raw
/// text. Never fails.
pub fn parse_recipes(text: &str) -> Vec<Recipe> {
    let trimmed = text.trim();
    let candidate = FENCED_BLOCK_RE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map_or(trimmed, |block| block.as_str().trim());

    match serde_json::from_str::<SuggestionPayload>(candidate) {
        Ok(SuggestionPayload::List(recipes)) | Ok(SuggestionPayload::Wrapped { recipes })
            if !recipes.is_empty() =>
        {
            recipes
        }
        _ => vec![Recipe::text_only(FALLBACK_TITLE, trimmed)],
    }
}
