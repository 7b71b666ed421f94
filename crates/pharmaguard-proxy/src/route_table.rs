//! Named routes
//!
//! The audit layer sees raw paths. Route definitions give them the names and
//! parameters the classifiers key on:
//!
//! ```yaml
//! routes:
//!   - name: prescriptions.show
//!     method: GET
//!     path: /prescriptions/{prescription}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteTableError {
    #[error("route '{0}' has an empty name")]
    EmptyName(String),

    #[error("route '{name}': malformed segment '{segment}'")]
    MalformedSegment { name: String, segment: String },

    #[error("route '{name}': parameter '{param}' appears twice")]
    DuplicateParameter { name: String, param: String },
}

/// One configured route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDefinition {
    pub name: String,

    /// Any method when unset
    #[serde(default)]
    pub method: Option<String>,

    pub path: String,
}

impl RouteDefinition {
    pub fn new(name: impl Into<String>, method: Option<&str>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: method.map(str::to_string),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
struct CompiledRoute {
    name: String,
    method: Option<String>,
    segments: Vec<Segment>,
}

impl CompiledRoute {
    fn compile(def: &RouteDefinition) -> Result<Self, RouteTableError> {
        if def.name.trim().is_empty() {
            return Err(RouteTableError::EmptyName(def.path.clone()));
        }

        let mut segments = Vec::new();
        for raw in split_path(&def.path) {
            let segment = match raw.strip_prefix('{') {
                Some(rest) => {
                    let param = rest
                        .strip_suffix('}')
                        .filter(|p| !p.is_empty() && !p.contains(['{', '}']))
                        .ok_or_else(|| RouteTableError::MalformedSegment {
                            name: def.name.clone(),
                            segment: raw.to_string(),
                        })?;
                    if segments.contains(&Segment::Param(param.to_string())) {
                        return Err(RouteTableError::DuplicateParameter {
                            name: def.name.clone(),
                            param: param.to_string(),
                        });
                    }
                    Segment::Param(param.to_string())
                }
                None if raw.contains(['{', '}']) => {
                    return Err(RouteTableError::MalformedSegment {
                        name: def.name.clone(),
                        segment: raw.to_string(),
                    })
                }
                None => Segment::Literal(raw.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            name: def.name.clone(),
            method: def.method.as_ref().map(|m| m.to_ascii_uppercase()),
            segments,
        })
    }

    fn matches(&self, method: &str, path: &[&str]) -> Option<RouteMatch> {
        if let Some(expected) = &self.method {
            if !expected.eq_ignore_ascii_case(method) {
                return None;
            }
        }
        if path.len() != self.segments.len() {
            return None;
        }

        let mut parameters = Vec::new();
        for (segment, actual) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(literal) if literal == actual => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => parameters.push((name.clone(), actual.to_string())),
            }
        }

        Some(RouteMatch {
            name: self.name.clone(),
            parameters,
        })
    }
}

/// A resolved route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub name: String,

    /// Parameter name and raw segment, in path order
    pub parameters: Vec<(String, String)>,
}

/// Ordered route definitions; the first match wins
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    pub fn new(definitions: &[RouteDefinition]) -> Result<Self, RouteTableError> {
        let routes = definitions
            .iter()
            .map(CompiledRoute::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { routes })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn resolve(&self, method: &str, path: &str) -> Option<RouteMatch> {
        let segments: Vec<&str> = split_path(path).collect();
        self.routes
            .iter()
            .find_map(|route| route.matches(method, &segments))
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
