//! Filter composition engine.
//!
//! Folds parsed filter values into one conjunctive [`ComposedQuery`], after
//! checking that the geospatial parameters are either all present or all
//! absent, then appends the distance predicate when they are present.

use super::geo::{geodesic_distance_m, GeoQuery};
use super::registry::ParsedFilters;
use crate::error::FilterError;
use crate::filter_types::{
    Accessor, AttributeValue, Comparison, Constraint, FilterOperator, GeoComponent,
};
use crate::publication::GeoPoint;
use std::cmp::Ordering;
use std::fmt;

/// One AND-ed condition of a composed query.
pub enum Predicate<T> {
    /// A constraint on a scalar attribute or on a one-hop relation attribute.
    Attribute {
        parameter: &'static str,
        attribute: &'static str,
        accessor: Accessor<T>,
        constraint: Constraint,
    },
    /// Geodesic distance from `center` at most `radius_meters` (inclusive).
    Within {
        attribute: &'static str,
        point: fn(&T) -> GeoPoint,
        center: GeoPoint,
        radius_meters: f64,
    },
}

impl<T> Predicate<T> {
    pub fn matches(&self, entity: &T) -> bool {
        match self {
            Predicate::Attribute {
                accessor,
                constraint,
                ..
            } => match constraint {
                Constraint::Always => true,
                Constraint::Compare(cmp, bound) => match accessor {
                    Accessor::Field(read) => {
                        read(entity).is_some_and(|v| compare(&v, *cmp, bound))
                    }
                    Accessor::Related(read) => {
                        read(entity).iter().any(|v| compare(v, *cmp, bound))
                    }
                    Accessor::Point(_) => false,
                },
            },
            Predicate::Within {
                point,
                center,
                radius_meters,
                ..
            } => geodesic_distance_m(&point(entity), center) <= *radius_meters,
        }
    }
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        match self {
            Predicate::Attribute {
                parameter,
                attribute,
                accessor,
                constraint,
            } => Predicate::Attribute {
                parameter: *parameter,
                attribute: *attribute,
                accessor: *accessor,
                constraint: constraint.clone(),
            },
            Predicate::Within {
                attribute,
                point,
                center,
                radius_meters,
            } => Predicate::Within {
                attribute: *attribute,
                point: *point,
                center: *center,
                radius_meters: *radius_meters,
            },
        }
    }
}

impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Attribute {
                parameter,
                attribute,
                constraint,
                ..
            } => f
                .debug_struct("Attribute")
                .field("parameter", parameter)
                .field("attribute", attribute)
                .field("constraint", constraint)
                .finish(),
            Predicate::Within {
                attribute,
                center,
                radius_meters,
                ..
            } => f
                .debug_struct("Within")
                .field("attribute", attribute)
                .field("center", center)
                .field("radius_meters", radius_meters)
                .finish(),
        }
    }
}

fn compare(value: &AttributeValue, cmp: Comparison, bound: &AttributeValue) -> bool {
    match cmp {
        Comparison::Eq => values_eq(value, bound),
        Comparison::Ge => values_cmp(value, bound).is_some_and(|o| o != Ordering::Less),
        Comparison::Le => values_cmp(value, bound).is_some_and(|o| o != Ordering::Greater),
    }
}

fn values_eq(a: &AttributeValue, b: &AttributeValue) -> bool {
    match (a, b) {
        (AttributeValue::String(x), AttributeValue::String(y)) => x == y,
        (AttributeValue::Boolean(x), AttributeValue::Boolean(y)) => x == y,
        (AttributeValue::Integer(x), AttributeValue::Integer(y)) => x == y,
        (AttributeValue::Float(_), _) | (_, AttributeValue::Float(_)) => {
            match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
                _ => false,
            }
        }
        _ => false,
    }
}

/// Ordering is only defined between numeric values.
fn values_cmp(a: &AttributeValue, b: &AttributeValue) -> Option<Ordering> {
    match (a, b) {
        (AttributeValue::Integer(x), AttributeValue::Integer(y)) => Some(x.cmp(y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

/// A conjunction of predicates over entities of type `T`.
pub struct ComposedQuery<T> {
    predicates: Vec<Predicate<T>>,
}

impl<T> ComposedQuery<T> {
    /// The unfiltered collection.
    pub fn all() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    /// Narrows the query by one more predicate.
    pub fn and(mut self, predicate: Predicate<T>) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn predicates(&self) -> &[Predicate<T>] {
        &self.predicates
    }

    pub fn is_unfiltered(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Whether the query has a distance predicate.
    pub fn is_geo(&self) -> bool {
        self.predicates
            .iter()
            .any(|p| matches!(p, Predicate::Within { .. }))
    }

    pub fn matches(&self, entity: &T) -> bool {
        self.predicates.iter().all(|p| p.matches(entity))
    }
}

impl<T> Default for ComposedQuery<T> {
    fn default() -> Self {
        Self::all()
    }
}

impl<T> Clone for ComposedQuery<T> {
    fn clone(&self) -> Self {
        Self {
            predicates: self.predicates.clone(),
        }
    }
}

impl<T> fmt::Debug for ComposedQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.predicates).finish()
    }
}

/// Checks the all-or-nothing rule for the distance-search parameters and
/// builds the [`GeoQuery`] when all of them are present.
///
/// Must run before any predicate is applied so an incomplete triple rejects
/// the whole request.
pub fn validate_geo_triple<T>(
    parsed: &ParsedFilters<'_, T>,
) -> Result<Option<GeoQuery<T>>, FilterError> {
    let mut latitude = None;
    let mut longitude = None;
    let mut max_distance = None;
    let mut point = None;
    let mut target = "";

    for parsed_value in parsed.iter() {
        let spec = parsed_value.spec;
        let FilterOperator::Proximity(component) = spec.operator else {
            continue;
        };
        target = spec.attribute;
        if let Accessor::Point(read) = spec.accessor {
            point = Some((spec.attribute, read));
        }
        let Some(value) = &parsed_value.value else {
            continue;
        };
        let entry = (spec.parameter, value.as_f64().unwrap_or(f64::NAN));
        match component {
            GeoComponent::Latitude => latitude = Some(entry),
            GeoComponent::Longitude => longitude = Some(entry),
            GeoComponent::MaxDistance => max_distance = Some(entry),
        }
    }

    let (latitude, longitude, max_distance) = match (latitude, longitude, max_distance) {
        (None, None, None) => return Ok(None),
        (Some(lat), Some(lon), Some(dist)) => (lat, lon, dist),
        (lat, lon, dist) => {
            let present = GeoComponent::ALL
                .iter()
                .zip([lat.is_some(), lon.is_some(), dist.is_some()])
                .filter(|(_, present)| *present)
                .map(|(component, _)| component.name())
                .collect();
            return Err(FilterError::DistanceFilterMissingParameters { present });
        }
    };

    check_range(latitude, -90.0, 90.0, "a latitude within [-90, 90]")?;
    check_range(longitude, -180.0, 180.0, "a longitude within [-180, 180]")?;
    let (parameter, km) = max_distance;
    if km.is_nan() || km <= 0.0 {
        return Err(FilterError::InvalidParameterValue {
            parameter: parameter.to_string(),
            value: km.to_string(),
            expected: "a distance in kilometers greater than 0".to_string(),
        });
    }

    let Some((attribute, point)) = point else {
        return Err(FilterError::IncompatibleOperator {
            parameter: parameter.to_string(),
            attribute: target.to_string(),
            operator: format!("{:?}", FilterOperator::Proximity(GeoComponent::MaxDistance)),
        });
    };
    Ok(Some(GeoQuery {
        center: GeoPoint {
            latitude: latitude.1,
            longitude: longitude.1,
        },
        max_distance_km: km,
        attribute,
        point,
    }))
}

fn check_range(
    (parameter, value): (&'static str, f64),
    min: f64,
    max: f64,
    expected: &str,
) -> Result<(), FilterError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(FilterError::InvalidParameterValue {
            parameter: parameter.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        })
    }
}

/// Folds every resolved, non-geospatial value into `base` as an AND-ed predicate.
///
/// Absent values add nothing. Conditional operators contribute whatever
/// constraint their rule maps the value to, possibly a tautology.
pub fn compose<T>(base: ComposedQuery<T>, parsed: &ParsedFilters<'_, T>) -> ComposedQuery<T> {
    parsed.iter().fold(base, |query, parsed_value| {
        let Some(value) = &parsed_value.value else {
            return query;
        };
        let spec = parsed_value.spec;
        match spec.operator.constraint(value) {
            Some(constraint) => query.and(Predicate::Attribute {
                parameter: spec.parameter,
                attribute: spec.attribute,
                accessor: spec.accessor,
                constraint,
            }),
            None => query,
        }
    })
}

/// Adds the distance predicate, converting the radius from kilometers to meters.
pub fn append_geo_predicate<T>(query: ComposedQuery<T>, geo: Option<GeoQuery<T>>) -> ComposedQuery<T> {
    match geo {
        Some(geo) => {
            let radius_meters = geo.radius_meters();
            query.and(Predicate::Within {
                attribute: geo.attribute,
                point: geo.point,
                center: geo.center,
                radius_meters,
            })
        }
        None => query,
    }
}

/// Validates the geospatial triple, folds every filter, then appends the distance predicate.
pub fn validate_and_compose<T>(
    base: ComposedQuery<T>,
    parsed: &ParsedFilters<'_, T>,
) -> Result<ComposedQuery<T>, FilterError> {
    let geo = validate_geo_triple(parsed)?;
    Ok(append_geo_predicate(compose(base, parsed), geo))
}
