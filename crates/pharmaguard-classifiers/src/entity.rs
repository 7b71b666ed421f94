//! Entity extraction
//!
//! Resolution order:
//! 1. named route parameters (`prescription`, `user`, ...), bound objects first-class
//! 2. numeric id segments in the path (`/orders/17`)
//! 3. dictionary guess over path words
//! 4. null entity
//!
//! Nothing here fails: unexpected shapes degrade to empty fields.

use pharmaguard_core::{EntityRef, EntityType, RouteInfo, RouteParam};
use regex::Regex;
use std::collections::BTreeMap;

use crate::config::ClassificationConfig;

/// Extracts the entity a call refers to
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    parameters: Vec<String>,
    dictionary: BTreeMap<String, EntityType>,
    numeric: Regex,
    word: Regex,
}

impl EntityExtractor {
    pub fn new(config: &ClassificationConfig) -> Self {
        Self {
            parameters: config.entity_parameters.clone(),
            dictionary: config
                .entity_dictionary
                .iter()
                .map(|(word, entity)| (normalize(word), *entity))
                .collect(),
            numeric: Regex::new(r"^\d+$").expect("static regex"),
            word: Regex::new(r"^[A-Za-z][A-Za-z_-]*$").expect("static regex"),
        }
    }

    pub fn extract(&self, route: &RouteInfo) -> EntityRef {
        if let Some(entity) = self.from_parameters(route) {
            return entity;
        }

        if let Some(entity) = self.from_numeric_segment(&route.path) {
            return entity;
        }

        match self.guess(&route.path) {
            Some(entity_type) => EntityRef::new(Some(entity_type), None),
            None => EntityRef::none(),
        }
    }

    /// Look a path word up in the dictionary, tolerating plurals and dashes
    pub fn lookup(&self, word: &str) -> Option<EntityType> {
        let word = normalize(word);
        self.dictionary.get(&word).copied().or_else(|| {
            word.strip_suffix('s')
                .and_then(|singular| self.dictionary.get(singular).copied())
        })
    }

    fn from_parameters(&self, route: &RouteInfo) -> Option<EntityRef> {
        self.parameters.iter().find_map(|name| {
            let param = route.parameter(name)?;
            let entity_type = EntityType::from_name(name).or_else(|| self.lookup(name));

            let entity = match param {
                RouteParam::Entity(bound) => EntityRef::new(
                    entity_type.or_else(|| self.lookup(&bound.kind)),
                    bound.id,
                )
                .with_identifier(bound.identifier.clone()),
                RouteParam::Value(raw) => match raw.parse::<u64>() {
                    Ok(id) => EntityRef::new(entity_type, Some(id)),
                    Err(_) => EntityRef::new(entity_type, None)
                        .with_identifier(Some(raw.clone()).filter(|r| !r.is_empty())),
                },
            };
            Some(entity)
        })
    }

    fn from_numeric_segment(&self, path: &str) -> Option<EntityRef> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let (word, id) = segments
            .windows(2)
            .filter(|pair| self.word.is_match(pair[0]) && self.numeric.is_match(pair[1]))
            .filter_map(|pair| pair[1].parse::<u64>().ok().map(|id| (pair[0], id)))
            .last()?;

        let entity_type = self.lookup(word).or_else(|| self.guess(path));
        Some(EntityRef::new(entity_type, Some(id)))
    }

    fn guess(&self, path: &str) -> Option<EntityType> {
        path.split('/')
            .filter(|s| self.word.is_match(s))
            .filter_map(|s| self.lookup(s))
            .last()
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new(&ClassificationConfig::default())
    }
}

fn normalize(word: &str) -> String {
    word.to_ascii_lowercase().replace('-', "_")
}
