//! Filterable attributes of the stored entities.

use crate::filter_types::{Accessor, AttributeValue, Filterable};
use crate::publication::{Publication, PublicationStar};

fn integer(v: i64) -> Option<AttributeValue> {
    Some(AttributeValue::Integer(v))
}

impl Filterable for Publication {
    fn attribute(path: &str) -> Option<Accessor<Self>> {
        let accessor: Accessor<Self> = match path {
            "user_id" => Accessor::Field(|p: &Publication| integer(p.user_id)),
            "rooms" => Accessor::Field(|p: &Publication| integer(p.rooms)),
            "beds" => Accessor::Field(|p: &Publication| integer(p.beds)),
            "bathrooms" => Accessor::Field(|p: &Publication| integer(p.bathrooms)),
            "price_per_night" => {
                Accessor::Field(|p: &Publication| Some(AttributeValue::Float(p.price_per_night)))
            }
            "blocked" => Accessor::Field(|p: &Publication| Some(AttributeValue::Boolean(p.blocked))),
            "blockchain_status" => Accessor::Field(|p: &Publication| {
                Some(AttributeValue::String(
                    p.blockchain_status.as_str().to_string(),
                ))
            }),
            "blockchain_transaction_hash" => Accessor::Field(|p: &Publication| {
                p.blockchain_transaction_hash
                    .clone()
                    .map(AttributeValue::String)
            }),
            "loc" => Accessor::Point(|p: &Publication| p.loc),
            "stars.user_id" => Accessor::Related(|p: &Publication| {
                p.stars
                    .iter()
                    .map(|s| AttributeValue::Integer(s.user_id))
                    .collect()
            }),
            _ => return None,
        };
        Some(accessor)
    }
}

impl Filterable for PublicationStar {
    fn attribute(path: &str) -> Option<Accessor<Self>> {
        match path {
            "user_id" => Some(Accessor::Field(|s: &PublicationStar| integer(s.user_id))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publication::{GeoPoint, PublicationDraft};
    use chrono::Utc;

    fn publication() -> Publication {
        let draft = PublicationDraft {
            user_id: 3,
            title: "Cabin".into(),
            description: String::new(),
            rooms: 1,
            beds: 1,
            bathrooms: 1,
            price_per_night: 55.5,
            images: vec![],
            loc: GeoPoint::new(1.0, 2.0).unwrap(),
        };
        Publication::new(9, draft, Utc::now())
    }

    #[test]
    fn test_scalar_attributes() {
        let p = publication();
        let Some(Accessor::Field(read)) = Publication::attribute("price_per_night") else {
            panic!("expected a field accessor");
        };
        assert_eq!(read(&p), Some(AttributeValue::Float(55.5)));
        let Some(Accessor::Field(read)) = Publication::attribute("blockchain_transaction_hash") else {
            panic!("expected a field accessor");
        };
        assert_eq!(read(&p), None);
    }

    #[test]
    fn test_relation_attribute_enumerates_rows() {
        let mut p = publication();
        for user_id in [4, 8] {
            p.stars.push(PublicationStar {
                user_id,
                publication_id: p.id,
                created_at: Utc::now(),
            });
        }
        let Some(Accessor::Related(read)) = Publication::attribute("stars.user_id") else {
            panic!("expected a relation accessor");
        };
        assert_eq!(
            read(&p),
            vec![AttributeValue::Integer(4), AttributeValue::Integer(8)]
        );
    }

    #[test]
    fn test_unknown_paths() {
        assert!(Publication::attribute("title").is_none());
        assert!(Publication::attribute("stars.created_at").is_none());
        assert!(Publication::attribute("questions.user_id").is_none());
        assert!(PublicationStar::attribute("loc").is_none());
        assert!(PublicationStar::attribute("publication_id").is_none());
    }
}
