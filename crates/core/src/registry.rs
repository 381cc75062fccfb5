use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{FilterError, FilterResult};
use crate::filter::{Filter, FilterInputs, ParamDefinition};
use crate::source::ClipSource;

type FilterFactory = dyn Fn(&FilterInputs) -> FilterResult<Arc<dyn ClipSource>> + Send + Sync;

struct FilterEntry {
    factory: Box<FilterFactory>,
    definitions: Vec<ParamDefinition>,
}

pub struct FilterRegistry {
    filters: HashMap<String, FilterEntry>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self {
            filters: HashMap::new(),
        }
    }

    pub fn register<F, C>(&mut self, filter_type: &str, definitions: Vec<ParamDefinition>, ctor: C)
    where
        F: Filter + 'static,
        C: Fn(&FilterInputs) -> FilterResult<F> + Send + Sync + 'static,
    {
        let factory = move |inputs: &FilterInputs| -> FilterResult<Arc<dyn ClipSource>> {
            let filter = ctor(inputs)?;
            debug!(filter = filter.filter_type(), input = inputs.clip.name(), "created filter");
            Ok(Arc::new(filter))
        };
        self.filters.insert(
            filter_type.to_string(),
            FilterEntry {
                factory: Box::new(factory),
                definitions,
            },
        );
    }

    pub fn create(
        &self,
        filter_type: &str,
        inputs: &FilterInputs,
    ) -> FilterResult<Arc<dyn ClipSource>> {
        let entry = self
            .filters
            .get(filter_type)
            .ok_or_else(|| FilterError::UnknownFilter(filter_type.to_string()))?;
        (entry.factory)(inputs)
    }

    pub fn definitions(&self, filter_type: &str) -> Option<&[ParamDefinition]> {
        self.filters
            .get(filter_type)
            .map(|entry| entry.definitions.as_slice())
    }

    pub fn list_filter_types(&self) -> Vec<&str> {
        let mut filter_types: Vec<&str> = self.filters.keys().map(|v| v.as_str()).collect();
        filter_types.sort_unstable();
        filter_types
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register every filter in this crate under its public name.
pub fn register_all_filters(registry: &mut FilterRegistry) {
    use crate::filters::{
        Clense, ClenseKind, FluxKind, FluxSmooth, RankFilter, RankKind, RemoveGrain, Repair,
        SceneDetect, TTempSmooth, TemporalMedian, TemporalRepair, TemporalSoften, VerticalCleaner,
    };

    for kind in [RankKind::Median, RankKind::InterQuartileMean] {
        registry.register(kind.name(), RankFilter::definitions(), move |inputs| {
            RankFilter::from_inputs(kind, inputs)
        });
    }
    registry.register("RemoveGrain", RemoveGrain::definitions(), RemoveGrain::from_inputs);
    registry.register("Repair", Repair::definitions(), Repair::from_inputs);
    registry.register(
        "VerticalCleaner",
        VerticalCleaner::definitions(),
        VerticalCleaner::from_inputs,
    );
    for kind in [ClenseKind::Both, ClenseKind::Forward, ClenseKind::Backward] {
        registry.register(kind.name(), Clense::definitions(kind), move |inputs| {
            Clense::from_inputs(kind, inputs)
        });
    }
    registry.register(
        "TemporalMedian",
        TemporalMedian::definitions(),
        TemporalMedian::from_inputs,
    );
    registry.register(
        "TemporalSoften",
        TemporalSoften::definitions(),
        TemporalSoften::from_inputs,
    );
    for kind in [FluxKind::Temporal, FluxKind::SpatioTemporal] {
        registry.register(kind.name(), FluxSmooth::definitions(kind), move |inputs| {
            FluxSmooth::from_inputs(kind, inputs)
        });
    }
    registry.register(
        "TemporalRepair",
        TemporalRepair::definitions(),
        TemporalRepair::from_inputs,
    );
    registry.register("TTempSmooth", TTempSmooth::definitions(), TTempSmooth::from_inputs);
    registry.register("SceneDetect", SceneDetect::definitions(), SceneDetect::from_inputs);
}

pub fn build_default_registry() -> FilterRegistry {
    let mut registry = FilterRegistry::new();
    register_all_filters(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::filter::ParamType;
    use crate::test_support::{clip, flat_gray8, params};
    use crate::types::{Frame, VideoInfo};

    struct Passthrough {
        clip: Arc<dyn ClipSource>,
    }

    impl ClipSource for Passthrough {
        fn name(&self) -> &str {
            "Passthrough"
        }

        fn info(&self) -> VideoInfo {
            self.clip.info()
        }

        fn get_frame(&self, n: usize) -> FilterResult<Arc<Frame>> {
            self.clip.get_frame(n)
        }
    }

    impl Filter for Passthrough {
        fn filter_type(&self) -> &str {
            "Passthrough"
        }
    }

    #[test]
    fn test_filter_registry_register_and_create() {
        let mut registry = FilterRegistry::new();
        registry.register("Passthrough", vec![], |inputs| {
            Ok(Passthrough {
                clip: inputs.clip.clone(),
            })
        });

        let inputs = FilterInputs::new(clip(vec![flat_gray8(2, 2, 7)]), params(json!({})));
        let filter = registry
            .create("Passthrough", &inputs)
            .expect("passthrough should be created");

        assert_eq!(filter.name(), "Passthrough");
        assert_eq!(filter.get_frame(0).unwrap().plane(0).read(1, 1), 7.0);
        assert_eq!(registry.list_filter_types(), vec!["Passthrough"]);
    }

    #[test]
    fn test_filter_registry_unknown_type_errors() {
        let registry = build_default_registry();
        let inputs = FilterInputs::new(clip(vec![flat_gray8(2, 2, 0)]), params(json!({})));

        for filter_type in ["unknown", "removegrain", "Rescale"] {
            let err = match registry.create(filter_type, &inputs) {
                Ok(_) => panic!("unknown filter type should error"),
                Err(err) => err,
            };
            assert_eq!(err, FilterError::UnknownFilter(filter_type.to_string()));
        }
    }

    #[test]
    fn test_register_all_filters_expected_set() {
        let registry = build_default_registry();
        let expected = vec![
            "BackwardClense",
            "Clense",
            "FluxSmoothST",
            "FluxSmoothT",
            "ForwardClense",
            "InterQuartileMean",
            "Median",
            "RemoveGrain",
            "Repair",
            "SceneDetect",
            "TTempSmooth",
            "TemporalMedian",
            "TemporalRepair",
            "TemporalSoften",
            "VerticalCleaner",
        ];
        assert_eq!(registry.list_filter_types(), expected);
    }

    #[test]
    fn test_definitions_describe_required_inputs() {
        let registry = build_default_registry();
        let repair = registry.definitions("Repair").unwrap();
        assert!(repair
            .iter()
            .any(|d| d.name == "repairclip" && d.param_type == ParamType::Clip && d.required));
        let median = registry.definitions("Median").unwrap();
        assert_eq!(median[0].default_value, Some(json!(1)));
        assert!(registry.definitions("Nope").is_none());
    }

    #[test]
    fn test_created_filters_chain() {
        let registry = build_default_registry();
        let mut spike = flat_gray8(3, 3, 128);
        spike.planes[0].write(1, 1, 200.0);
        let input = clip(vec![spike]);

        let grain = registry
            .create(
                "RemoveGrain",
                &FilterInputs::new(input.clone(), params(json!({"mode": 1}))),
            )
            .unwrap();
        let repaired = registry
            .create(
                "Repair",
                &FilterInputs::new(grain, params(json!({"mode": 1})))
                    .with_clip("repairclip", input),
            )
            .unwrap();
        assert_eq!(repaired.get_frame(0).unwrap().plane(0).read(1, 1), 128.0);
    }

    #[test]
    fn test_missing_required_clip_is_invalid_parameter() {
        let registry = build_default_registry();
        let inputs = FilterInputs::new(clip(vec![flat_gray8(2, 2, 0)]), params(json!({"mode": 1})));
        assert!(matches!(
            registry.create("Repair", &inputs),
            Err(FilterError::InvalidParameter { .. })
        ));
    }
}
