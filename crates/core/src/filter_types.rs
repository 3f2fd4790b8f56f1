//! Filter types shared by the registry, the composition engine, and the store.
//!
//! Operators form a closed set and attribute paths are resolved to plain
//! accessor functions when a filter is registered, so evaluating a query never
//! looks attributes up by name.

use crate::publication::GeoPoint;
use std::fmt;

/// A typed attribute value, either read from an entity or coerced from a query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
}

impl AttributeValue {
    /// Numeric view used by ordering comparisons. Strings and booleans have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(i) => Some(*i as f64),
            AttributeValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Integer(i) => write!(f, "{}", i),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// How a raw query-string value is coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Integer,
    /// Finite floating-point number.
    Float,
    String,
    /// Exactly `"true"` or `"false"`.
    Boolean,
    /// A string restricted to a fixed set of literals.
    Enumerated(&'static [&'static str]),
}

impl ValueType {
    /// Coerces `raw` into a typed value. On failure returns a description of what was expected.
    pub fn coerce(&self, raw: &str) -> Result<AttributeValue, String> {
        match self {
            ValueType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(AttributeValue::Integer)
                .map_err(|_| self.expected()),
            ValueType::Float => match raw.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(AttributeValue::Float(v)),
                _ => Err(self.expected()),
            },
            ValueType::String => Ok(AttributeValue::String(raw.to_string())),
            ValueType::Boolean => match raw {
                "true" => Ok(AttributeValue::Boolean(true)),
                "false" => Ok(AttributeValue::Boolean(false)),
                _ => Err(self.expected()),
            },
            ValueType::Enumerated(allowed) => {
                if allowed.contains(&raw) {
                    Ok(AttributeValue::String(raw.to_string()))
                } else {
                    Err(self.expected())
                }
            }
        }
    }

    /// Human-readable description of the accepted input.
    pub fn expected(&self) -> String {
        match self {
            ValueType::Integer => "an integer".to_string(),
            ValueType::Float => "a finite number".to_string(),
            ValueType::String => "a string".to_string(),
            ValueType::Boolean => "one of: true, false".to_string(),
            ValueType::Enumerated(allowed) => format!("one of: {}", allowed.join(", ")),
        }
    }
}

/// What happens when a registered parameter is absent from the request.
#[derive(Debug, Clone, PartialEq)]
pub enum Presence {
    /// Absence is a client error.
    Required,
    /// Absence means the filter is not applied.
    Optional,
    /// Absence materializes this value, as if the caller had passed it.
    Default(AttributeValue),
}

/// Ordering/equality comparison between an attribute and a bound value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Ge,
    Le,
    Eq,
}

/// The constraint a single filter places on its target attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Compare(Comparison, AttributeValue),
    /// Tautology: matches every entity, whatever the attribute holds.
    Always,
}

/// Which member of the geospatial parameter triple a parameter is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoComponent {
    Latitude,
    Longitude,
    /// Search radius in kilometers.
    MaxDistance,
}

impl GeoComponent {
    pub const ALL: [GeoComponent; 3] = [
        GeoComponent::Latitude,
        GeoComponent::Longitude,
        GeoComponent::MaxDistance,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GeoComponent::Latitude => "latitude",
            GeoComponent::Longitude => "longitude",
            GeoComponent::MaxDistance => "max_distance",
        }
    }
}

/// Operator bound to a registered filter parameter.
#[derive(Clone, Copy)]
pub enum FilterOperator {
    Ge,
    Le,
    Eq,
    /// Maps the resolved value to a constraint instead of comparing literally.
    Conditional(fn(&AttributeValue) -> Constraint),
    /// One coordinate of the distance search; consumed by the geo predicate, never folded.
    Proximity(GeoComponent),
}

impl fmt::Debug for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterOperator::Ge => f.write_str("Ge"),
            FilterOperator::Le => f.write_str("Le"),
            FilterOperator::Eq => f.write_str("Eq"),
            FilterOperator::Conditional(_) => f.write_str("Conditional"),
            FilterOperator::Proximity(c) => write!(f, "Proximity({})", c.name()),
        }
    }
}

impl FilterOperator {
    /// The constraint this operator places on its attribute for `value`.
    /// `None` for proximity parameters.
    pub fn constraint(&self, value: &AttributeValue) -> Option<Constraint> {
        match self {
            FilterOperator::Ge => Some(Constraint::Compare(Comparison::Ge, value.clone())),
            FilterOperator::Le => Some(Constraint::Compare(Comparison::Le, value.clone())),
            FilterOperator::Eq => Some(Constraint::Compare(Comparison::Eq, value.clone())),
            FilterOperator::Conditional(rule) => Some(rule(value)),
            FilterOperator::Proximity(_) => None,
        }
    }
}

/// Blocked-state rule: `true` keeps only entities whose attribute is `false`,
/// anything else leaves the query untouched.
pub fn exclude_when_true(value: &AttributeValue) -> Constraint {
    match value {
        AttributeValue::Boolean(true) => {
            Constraint::Compare(Comparison::Eq, AttributeValue::Boolean(false))
        }
        _ => Constraint::Always,
    }
}

/// Reads one filterable attribute from an entity.
pub enum Accessor<T> {
    /// A scalar attribute; `None` when the entity has no value for it.
    Field(fn(&T) -> Option<AttributeValue>),
    /// One attribute of each row of a one-hop relation. A constraint on it
    /// holds if any related row satisfies it.
    Related(fn(&T) -> Vec<AttributeValue>),
    /// A point-valued attribute usable by distance predicates.
    Point(fn(&T) -> GeoPoint),
}

impl<T> Clone for Accessor<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Accessor<T> {}

impl<T> fmt::Debug for Accessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::Field(_) => f.write_str("Field"),
            Accessor::Related(_) => f.write_str("Related"),
            Accessor::Point(_) => f.write_str("Point"),
        }
    }
}

/// An entity whose attributes can be targeted by filters.
///
/// Paths are attribute names, or `relation.attribute` for one-hop relations.
pub trait Filterable: Sized {
    fn attribute(path: &str) -> Option<Accessor<Self>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_integer() {
        assert_eq!(ValueType::Integer.coerce("3"), Ok(AttributeValue::Integer(3)));
        assert_eq!(ValueType::Integer.coerce(" -2 "), Ok(AttributeValue::Integer(-2)));
        assert!(ValueType::Integer.coerce("2.5").is_err());
        assert!(ValueType::Integer.coerce("two").is_err());
    }

    #[test]
    fn test_coerce_float_rejects_non_finite() {
        assert_eq!(ValueType::Float.coerce("15.7"), Ok(AttributeValue::Float(15.7)));
        assert_eq!(ValueType::Float.coerce("1"), Ok(AttributeValue::Float(1.0)));
        assert!(ValueType::Float.coerce("NaN").is_err());
        assert!(ValueType::Float.coerce("inf").is_err());
        assert!(ValueType::Float.coerce("").is_err());
    }

    #[test]
    fn test_coerce_boolean_literal_set() {
        assert_eq!(ValueType::Boolean.coerce("true"), Ok(AttributeValue::Boolean(true)));
        assert_eq!(ValueType::Boolean.coerce("false"), Ok(AttributeValue::Boolean(false)));
        assert!(ValueType::Boolean.coerce("True").is_err());
        assert!(ValueType::Boolean.coerce("1").is_err());
        assert!(ValueType::Boolean.coerce("yes").is_err());
    }

    #[test]
    fn test_coerce_enumerated() {
        let ty = ValueType::Enumerated(&["A", "B"]);
        assert_eq!(ty.coerce("B"), Ok(AttributeValue::String("B".into())));
        let err = ty.coerce("C").unwrap_err();
        assert_eq!(err, "one of: A, B");
    }

    #[test]
    fn test_exclude_when_true() {
        assert_eq!(
            exclude_when_true(&AttributeValue::Boolean(true)),
            Constraint::Compare(Comparison::Eq, AttributeValue::Boolean(false))
        );
        assert_eq!(
            exclude_when_true(&AttributeValue::Boolean(false)),
            Constraint::Always
        );
    }

    #[test]
    fn test_proximity_has_no_constraint() {
        let op = FilterOperator::Proximity(GeoComponent::Latitude);
        assert!(op.constraint(&AttributeValue::Float(1.0)).is_none());
    }
}
