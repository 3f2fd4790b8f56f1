//! Filter specification registry.
//!
//! A [`FilterRegistry`] declares which query parameters a search endpoint
//! understands, what attribute each one targets, how its raw string is
//! coerced and what happens when it is absent. Attribute paths are resolved
//! against the entity schema once, at registration.

use crate::error::FilterError;
use crate::filter_types::{
    Accessor, AttributeValue, FilterOperator, Filterable, Presence, ValueType,
};
use std::collections::HashMap;

/// One registered query parameter.
pub struct FilterSpec<T> {
    pub parameter: &'static str,
    /// Attribute path, `relation.attribute` for one-hop relations.
    pub attribute: &'static str,
    pub operator: FilterOperator,
    pub value_type: ValueType,
    pub presence: Presence,
    pub(crate) accessor: Accessor<T>,
}

impl<T> std::fmt::Debug for FilterSpec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterSpec")
            .field("parameter", &self.parameter)
            .field("attribute", &self.attribute)
            .field("operator", &self.operator)
            .field("value_type", &self.value_type)
            .field("presence", &self.presence)
            .finish()
    }
}

/// Ordered set of filter specs for one entity type.
pub struct FilterRegistry<T> {
    specs: Vec<FilterSpec<T>>,
}

impl<T: Filterable> Default for FilterRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Filterable> FilterRegistry<T> {
    pub fn new() -> Self {
        Self { specs: Vec::new() }
    }

    /// Registers a parameter.
    ///
    /// Fails when the parameter is already registered, when the attribute is
    /// not part of `T`'s schema, when the operator cannot act on the
    /// attribute's kind, or when a default value does not fit `value_type`.
    pub fn register(
        &mut self,
        parameter: &'static str,
        attribute: &'static str,
        operator: FilterOperator,
        value_type: ValueType,
        presence: Presence,
    ) -> Result<&FilterSpec<T>, FilterError> {
        if self.get(parameter).is_some() {
            return Err(FilterError::DuplicateParameter {
                parameter: parameter.to_string(),
            });
        }

        let accessor = T::attribute(attribute).ok_or_else(|| FilterError::UnknownAttribute {
            parameter: parameter.to_string(),
            attribute: attribute.to_string(),
        })?;

        let compatible = match (&operator, &accessor) {
            (FilterOperator::Proximity(_), Accessor::Point(_)) => true,
            (FilterOperator::Proximity(_), _) | (_, Accessor::Point(_)) => false,
            _ => true,
        };
        if !compatible {
            return Err(FilterError::IncompatibleOperator {
                parameter: parameter.to_string(),
                attribute: attribute.to_string(),
                operator: format!("{:?}", operator),
            });
        }

        if let Presence::Default(value) = &presence {
            if value_type.coerce(&value.to_string()).as_ref() != Ok(value) {
                return Err(FilterError::InvalidParameterValue {
                    parameter: parameter.to_string(),
                    value: value.to_string(),
                    expected: value_type.expected(),
                });
            }
        }

        self.specs.push(FilterSpec {
            parameter,
            attribute,
            operator,
            value_type,
            presence,
            accessor,
        });
        Ok(&self.specs[self.specs.len() - 1])
    }

    /// Specs in registration order.
    pub fn specs(&self) -> &[FilterSpec<T>] {
        &self.specs
    }

    pub fn get(&self, parameter: &str) -> Option<&FilterSpec<T>> {
        self.specs.iter().find(|s| s.parameter == parameter)
    }

    /// Resolves every registered spec against the raw query parameters.
    ///
    /// Absent optional parameters resolve to no value, absent defaulted ones
    /// to their default. Keys that match no spec are ignored.
    pub fn parse(&self, raw: &HashMap<String, String>) -> Result<ParsedFilters<'_, T>, FilterError> {
        let mut values = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            let value = match raw.get(spec.parameter) {
                Some(raw_value) => Some(spec.value_type.coerce(raw_value).map_err(|expected| {
                    FilterError::InvalidParameterValue {
                        parameter: spec.parameter.to_string(),
                        value: raw_value.clone(),
                        expected,
                    }
                })?),
                None => match &spec.presence {
                    Presence::Required => {
                        return Err(FilterError::MissingRequiredParameter {
                            parameter: spec.parameter.to_string(),
                        })
                    }
                    Presence::Optional => None,
                    Presence::Default(value) => Some(value.clone()),
                },
            };
            values.push(ParsedFilterValue { spec, value });
        }
        Ok(ParsedFilters { values })
    }
}

/// A spec together with its resolved value for one request.
pub struct ParsedFilterValue<'r, T> {
    pub spec: &'r FilterSpec<T>,
    pub value: Option<AttributeValue>,
}

/// The resolved values of every spec of a registry, in registration order.
pub struct ParsedFilters<'r, T> {
    values: Vec<ParsedFilterValue<'r, T>>,
}

impl<'r, T> ParsedFilters<'r, T> {
    pub fn get(&self, parameter: &str) -> Option<&ParsedFilterValue<'r, T>> {
        self.values.iter().find(|v| v.spec.parameter == parameter)
    }

    /// The resolved value of `parameter`, if registered and present.
    pub fn value(&self, parameter: &str) -> Option<&AttributeValue> {
        self.get(parameter).and_then(|v| v.value.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParsedFilterValue<'r, T>> {
        self.values.iter()
    }

    /// Same values in a different fold order. `order` holds indices into the
    /// current order; indices out of range are skipped.
    #[cfg(test)]
    pub(crate) fn reordered(self, order: &[usize]) -> Self {
        let mut slots: Vec<Option<ParsedFilterValue<'r, T>>> =
            self.values.into_iter().map(Some).collect();
        let values = order
            .iter()
            .filter_map(|&i| slots.get_mut(i).and_then(Option::take))
            .collect();
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter_types::{exclude_when_true, GeoComponent};
    use crate::publication::Publication;
    use crate::search::filter::validate_geo_triple;

    fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let mut reg = FilterRegistry::<Publication>::new();
        reg.register("rooms", "rooms", FilterOperator::Ge, ValueType::Integer, Presence::Optional)
            .unwrap();
        let err = reg
            .register("rooms", "beds", FilterOperator::Ge, ValueType::Integer, Presence::Optional)
            .unwrap_err();
        assert_eq!(
            err,
            FilterError::DuplicateParameter {
                parameter: "rooms".into()
            }
        );
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let mut reg = FilterRegistry::<Publication>::new();
        let err = reg
            .register("floor", "floor", FilterOperator::Eq, ValueType::Integer, Presence::Optional)
            .unwrap_err();
        assert!(matches!(err, FilterError::UnknownAttribute { .. }));
        let err = reg
            .register(
                "images_url",
                "images.url",
                FilterOperator::Eq,
                ValueType::String,
                Presence::Optional,
            )
            .unwrap_err();
        assert!(matches!(err, FilterError::UnknownAttribute { .. }));
    }

    #[test]
    fn test_operator_must_fit_attribute_kind() {
        let mut reg = FilterRegistry::<Publication>::new();
        let err = reg
            .register(
                "latitude",
                "rooms",
                FilterOperator::Proximity(GeoComponent::Latitude),
                ValueType::Float,
                Presence::Optional,
            )
            .unwrap_err();
        assert!(matches!(err, FilterError::IncompatibleOperator { .. }));
        let err = reg
            .register("loc", "loc", FilterOperator::Eq, ValueType::Float, Presence::Optional)
            .unwrap_err();
        assert!(matches!(err, FilterError::IncompatibleOperator { .. }));
    }

    #[test]
    fn test_default_must_fit_value_type() {
        let mut reg = FilterRegistry::<Publication>::new();
        let err = reg
            .register(
                "filter_blocked",
                "blocked",
                FilterOperator::Conditional(exclude_when_true),
                ValueType::Boolean,
                Presence::Default(AttributeValue::String("yes".into())),
            )
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidParameterValue { .. }));
    }

    #[test]
    fn test_parse_resolves_defaults_and_ignores_unknown() {
        let mut reg = FilterRegistry::<Publication>::new();
        reg.register("rooms", "rooms", FilterOperator::Ge, ValueType::Integer, Presence::Optional)
            .unwrap();
        reg.register(
            "filter_blocked",
            "blocked",
            FilterOperator::Conditional(exclude_when_true),
            ValueType::Boolean,
            Presence::Default(AttributeValue::Boolean(true)),
        )
        .unwrap();

        let parsed = reg.parse(&raw(&[("page", "2"), ("sort", "price")])).unwrap();
        assert_eq!(parsed.value("rooms"), None);
        assert_eq!(
            parsed.value("filter_blocked"),
            Some(&AttributeValue::Boolean(true))
        );
        assert!(parsed.get("page").is_none());
        assert_eq!(parsed.iter().count(), 2);
    }

    #[test]
    fn test_parse_coercion_error_names_parameter() {
        let mut reg = FilterRegistry::<Publication>::new();
        reg.register(
            "price_per_night_min",
            "price_per_night",
            FilterOperator::Ge,
            ValueType::Float,
            Presence::Optional,
        )
        .unwrap();
        let err = reg
            .parse(&raw(&[("price_per_night_min", "cheap")]))
            .err()
            .unwrap();
        assert_eq!(
            err,
            FilterError::InvalidParameterValue {
                parameter: "price_per_night_min".into(),
                value: "cheap".into(),
                expected: "a finite number".into(),
            }
        );
    }

    #[test]
    fn test_parse_missing_required() {
        let mut reg = FilterRegistry::<Publication>::new();
        reg.register("user_id", "user_id", FilterOperator::Eq, ValueType::Integer, Presence::Required)
            .unwrap();
        let err = reg.parse(&raw(&[])).err().unwrap();
        assert_eq!(
            err,
            FilterError::MissingRequiredParameter {
                parameter: "user_id".into()
            }
        );
        assert!(reg.parse(&raw(&[("user_id", "4")])).is_ok());
    }

    #[test]
    fn test_explicit_value_overrides_default() {
        let mut reg = FilterRegistry::<Publication>::new();
        reg.register(
            "filter_blocked",
            "blocked",
            FilterOperator::Conditional(exclude_when_true),
            ValueType::Boolean,
            Presence::Default(AttributeValue::Boolean(true)),
        )
        .unwrap();
        let parsed = reg.parse(&raw(&[("filter_blocked", "false")])).unwrap();
        assert_eq!(
            parsed.value("filter_blocked"),
            Some(&AttributeValue::Boolean(false))
        );
    }

    #[test]
    fn test_distance_params_without_point_attribute_fail() {
        let mut reg = FilterRegistry::<Publication>::new();
        // Bypasses `register`, which refuses Proximity on a scalar attribute.
        for component in GeoComponent::ALL {
            reg.specs.push(FilterSpec {
                parameter: component.name(),
                attribute: "price_per_night",
                operator: FilterOperator::Proximity(component),
                value_type: ValueType::Float,
                presence: Presence::Optional,
                accessor: Accessor::Field(|p: &Publication| {
                    Some(AttributeValue::Float(p.price_per_night))
                }),
            });
        }
        let parsed = reg
            .parse(&raw(&[
                ("latitude", "0"),
                ("longitude", "0"),
                ("max_distance", "5"),
            ]))
            .unwrap();
        let err = validate_geo_triple(&parsed).unwrap_err();
        assert!(matches!(
            err,
            FilterError::IncompatibleOperator { ref parameter, ref attribute, .. }
                if parameter == "max_distance" && attribute == "price_per_night"
        ));
    }
}
