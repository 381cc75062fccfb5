use std::collections::HashMap;
use std::sync::Arc;

use crate::params::ParamMap;
use crate::source::ClipSource;

/// Value kinds a filter parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Int,
    IntList,
    Float,
    FloatList,
    Bool,
    Clip,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDefinition {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    pub default_value: Option<serde_json::Value>,
}

impl ParamDefinition {
    pub fn required(name: &str, param_type: ParamType) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            required: true,
            default_value: None,
        }
    }

    pub fn optional(name: &str, param_type: ParamType, default_value: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            required: false,
            default_value: Some(default_value),
        }
    }

    /// Optional parameter whose absence has its own meaning (e.g. "all planes").
    pub fn unset(name: &str, param_type: ParamType) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            required: false,
            default_value: None,
        }
    }
}

/// Everything a filter factory receives: the main clip, named secondary
/// clips (`repairclip`, `pfclip`, ...) and the raw parameter map.
pub struct FilterInputs {
    pub clip: Arc<dyn ClipSource>,
    pub clips: HashMap<String, Arc<dyn ClipSource>>,
    pub params: ParamMap,
}

impl FilterInputs {
    pub fn new(clip: Arc<dyn ClipSource>, params: ParamMap) -> Self {
        Self {
            clip,
            clips: HashMap::new(),
            params,
        }
    }

    pub fn with_clip(mut self, name: &str, clip: Arc<dyn ClipSource>) -> Self {
        self.clips.insert(name.to_string(), clip);
        self
    }

    pub fn named_clip(&self, name: &str) -> Option<Arc<dyn ClipSource>> {
        self.clips.get(name).cloned()
    }
}

/// A configured filter. Filters are clips themselves, so they chain.
pub trait Filter: ClipSource {
    fn filter_type(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_definition_creation() {
        let mode = ParamDefinition::required("mode", ParamType::IntList);
        let radius = ParamDefinition::optional("radius", ParamType::IntList, serde_json::json!(1));
        let planes = ParamDefinition::unset("planes", ParamType::IntList);

        assert!(mode.required);
        assert!(mode.default_value.is_none());
        assert!(!radius.required);
        assert_eq!(radius.default_value, Some(serde_json::json!(1)));
        assert!(!planes.required);
        assert!(planes.default_value.is_none());
    }
}
