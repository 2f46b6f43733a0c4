//! Relation shape classification.

use serde::Serialize;

use super::{RelationAttribute, RelationTarget};

/// Shape of a declared relation, as seen from the side declaring it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    /// Single target, no inverse field.
    OneWay,
    /// Single target whose inverse is single.
    OneToOne,
    /// Single target whose inverse is multiple.
    ManyToOne,
    /// Multiple targets whose inverse is single. The foreign key lives on
    /// the inverse side, so nothing is written from this side.
    OneToManyPassive,
    /// Multiple targets, no inverse field.
    ManyWay,
    /// Multiple targets whose inverse is multiple.
    ManyToMany,
    /// Wildcard targets and anything else.
    Unclassified,
}

impl RelationKind {
    /// Get the kind name used in logs and `inspect` output.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::OneWay => "oneWay",
            RelationKind::OneToOne => "oneToOne",
            RelationKind::ManyToOne => "manyToOne",
            RelationKind::OneToManyPassive => "oneToManyPassive",
            RelationKind::ManyWay => "manyWay",
            RelationKind::ManyToMany => "manyToMany",
            RelationKind::Unclassified => "unclassified",
        }
    }

    /// Check if relations of this kind are stored as a foreign-key column on
    /// the declaring row.
    pub fn is_foreign_key(&self) -> bool {
        matches!(
            self,
            RelationKind::OneWay | RelationKind::OneToOne | RelationKind::ManyToOne
        )
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a relation from its own shape and the shape of the attribute
/// found on the target model under `via`.
///
/// The rules overlap, so they are evaluated in a fixed order and the first
/// match wins.
pub fn classify(attribute: &RelationAttribute, inverse: Option<&RelationAttribute>) -> RelationKind {
    let inverse_single = inverse.is_some_and(|inv| {
        matches!(&inv.target, RelationTarget::Model(_)) && !inv.target.is_wildcard()
    });
    let inverse_multiple = inverse.is_some_and(|inv| {
        matches!(&inv.target, RelationTarget::Collection(_)) && !inv.target.is_wildcard()
    });
    let has_via = attribute.via.is_some();
    let wildcard = attribute.target.is_wildcard();

    match &attribute.target {
        RelationTarget::Model(_) if !has_via && !wildcard => RelationKind::OneWay,
        RelationTarget::Model(_) if has_via && inverse_single => RelationKind::OneToOne,
        RelationTarget::Model(_) if has_via && inverse_multiple => RelationKind::ManyToOne,
        RelationTarget::Collection(_) if has_via && inverse_single => {
            RelationKind::OneToManyPassive
        }
        RelationTarget::Collection(_) if !has_via && !wildcard => RelationKind::ManyWay,
        RelationTarget::Collection(_) if has_via && inverse_multiple => RelationKind::ManyToMany,
        _ => RelationKind::Unclassified,
    }
}
