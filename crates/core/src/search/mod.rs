//! Listing search: filter registries, query composition, and geodesic distance.

/// Filter composition engine: conjunctive queries and the distance predicate.
pub mod filter;
/// Geodesic distance on the WGS84 ellipsoid.
pub mod geo;
/// Filter specification registry.
pub mod registry;
mod schema;

pub use filter::{
    append_geo_predicate, compose, validate_and_compose, validate_geo_triple, ComposedQuery,
    Predicate,
};
pub use geo::{geodesic_distance_m, GeoQuery};
pub use registry::{FilterRegistry, FilterSpec, ParsedFilterValue, ParsedFilters};

use crate::error::FilterError;
use crate::filter_types::{
    exclude_when_true, AttributeValue, FilterOperator, GeoComponent, Presence, ValueType,
};
use crate::publication::{BlockchainStatus, Publication, PublicationStar};

/// Query parameters accepted by the listing search.
pub fn publication_filters() -> Result<FilterRegistry<Publication>, FilterError> {
    use FilterOperator::{Eq, Ge, Le};

    let mut registry = FilterRegistry::new();
    registry.register("bathrooms", "bathrooms", Ge, ValueType::Integer, Presence::Optional)?;
    registry.register("rooms", "rooms", Ge, ValueType::Integer, Presence::Optional)?;
    registry.register("beds", "beds", Ge, ValueType::Integer, Presence::Optional)?;
    registry.register(
        "price_per_night_min",
        "price_per_night",
        Ge,
        ValueType::Float,
        Presence::Optional,
    )?;
    registry.register(
        "price_per_night_max",
        "price_per_night",
        Le,
        ValueType::Float,
        Presence::Optional,
    )?;
    registry.register("user_id", "user_id", Eq, ValueType::Integer, Presence::Optional)?;
    registry.register(
        "blockchain_status",
        "blockchain_status",
        Eq,
        ValueType::Enumerated(BlockchainStatus::NAMES),
        Presence::Default(AttributeValue::String(
            BlockchainStatus::Confirmed.as_str().to_string(),
        )),
    )?;
    registry.register(
        "starring_user_id",
        "stars.user_id",
        Eq,
        ValueType::Integer,
        Presence::Optional,
    )?;
    registry.register(
        "blockchain_transaction_hash",
        "blockchain_transaction_hash",
        Eq,
        ValueType::String,
        Presence::Optional,
    )?;
    for component in GeoComponent::ALL {
        registry.register(
            component.name(),
            "loc",
            FilterOperator::Proximity(component),
            ValueType::Float,
            Presence::Optional,
        )?;
    }
    registry.register(
        "filter_blocked",
        "blocked",
        FilterOperator::Conditional(exclude_when_true),
        ValueType::Boolean,
        Presence::Default(AttributeValue::Boolean(true)),
    )?;
    Ok(registry)
}

/// Query parameters accepted when listing a publication's stars.
pub fn star_filters() -> Result<FilterRegistry<PublicationStar>, FilterError> {
    let mut registry = FilterRegistry::new();
    registry.register(
        "user_id",
        "user_id",
        FilterOperator::Eq,
        ValueType::Integer,
        Presence::Optional,
    )?;
    Ok(registry)
}
