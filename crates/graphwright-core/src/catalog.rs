use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::BlockSchema;

/// One node type a graph may instantiate. Supplied externally, never mutated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: BlockSchema,
    #[serde(default)]
    pub output_schema: BlockSchema,
    #[serde(default)]
    pub static_output: bool,
    #[serde(default)]
    pub categories: Vec<BlockCategory>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Category tag; catalogs emit either bare strings or `{category, description}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockCategory {
    Name(String),
    Detailed {
        category: String,
        #[serde(default)]
        description: String,
    },
}

impl BlockCategory {
    pub fn name(&self) -> &str {
        match self {
            BlockCategory::Name(name) => name,
            BlockCategory::Detailed { category, .. } => category,
        }
    }
}

impl BlockDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_ai(&self) -> bool {
        self.categories
            .iter()
            .any(|c| c.name().eq_ignore_ascii_case("ai"))
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "Unknown Block"
        } else {
            &self.name
        }
    }
}

/// Compact view of a block handed to collaborators that build prompts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub input_schema: &'a BlockSchema,
    pub output_schema: &'a BlockSchema,
}

/// Immutable, id-indexed snapshot of the block catalog.
///
/// Passed explicitly into every validation and fix call; refreshing it is the
/// job of [`crate::catalog_cache::CatalogCache`].
#[derive(Debug, Clone, Default)]
pub struct BlockCatalog {
    blocks: Vec<BlockDefinition>,
    index: HashMap<String, usize>,
}

impl BlockCatalog {
    pub fn new(blocks: Vec<BlockDefinition>) -> Self {
        let mut index = HashMap::with_capacity(blocks.len());
        for (i, block) in blocks.iter().enumerate() {
            // First definition wins on duplicate ids.
            index.entry(block.id.clone()).or_insert(i);
        }
        Self { blocks, index }
    }

    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        let blocks: Vec<BlockDefinition> = serde_json::from_value(value)?;
        Ok(Self::new(blocks))
    }

    pub fn get(&self, block_id: &str) -> Option<&BlockDefinition> {
        self.index.get(block_id).map(|&i| &self.blocks[i])
    }

    pub fn contains(&self, block_id: &str) -> bool {
        self.index.contains_key(block_id)
    }

    pub fn blocks(&self) -> &[BlockDefinition] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn summaries(&self) -> Vec<BlockSummary<'_>> {
        self.blocks
            .iter()
            .map(|b| BlockSummary {
                id: &b.id,
                name: &b.name,
                description: &b.description,
                input_schema: &b.input_schema,
                output_schema: &b.output_schema,
            })
            .collect()
    }
}

impl FromIterator<BlockDefinition> for BlockCatalog {
    fn from_iter<I: IntoIterator<Item = BlockDefinition>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_wire_catalog() {
        let catalog = BlockCatalog::from_json(json!([
            {
                "id": "llm",
                "name": "AITextGeneratorBlock",
                "description": "Generate text",
                "inputSchema": {
                    "properties": {"prompt": {"type": "string"}, "model": {"type": "string"}},
                    "required": ["prompt"]
                },
                "outputSchema": {"properties": {"response": {"type": "string"}}},
                "staticOutput": false,
                "categories": [{"category": "AI", "description": "Uses a model"}]
            },
            {"id": "store", "name": "StoreValueBlock", "staticOutput": true, "categories": ["BASIC"]}
        ]))
        .unwrap();

        assert_eq!(catalog.len(), 2);
        let llm = catalog.get("llm").unwrap();
        assert!(llm.is_ai());
        assert_eq!(llm.input_schema.required, vec!["prompt"]);
        assert_eq!(llm.output_schema.type_of("response"), Some("string"));

        let store = catalog.get("store").unwrap();
        assert!(store.static_output);
        assert!(!store.is_ai());
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn first_duplicate_wins() {
        let catalog: BlockCatalog = vec![
            BlockDefinition::new("a", "First"),
            BlockDefinition::new("a", "Second"),
        ]
        .into_iter()
        .collect();
        assert_eq!(catalog.get("a").unwrap().name, "First");
    }

    #[test]
    fn summaries_use_wire_names() {
        let catalog = BlockCatalog::new(vec![BlockDefinition::new("a", "A")]);
        let value = serde_json::to_value(catalog.summaries()).unwrap();
        assert_eq!(value[0]["name"], json!("A"));
        assert!(value[0].get("inputSchema").is_some());
    }
}
