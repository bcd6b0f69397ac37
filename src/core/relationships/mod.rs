//! Class relationships: segmenting a class, classifying each segment and
//! merging the per-segment guesses into one relationship per target class.

mod classifier;
mod segment;

pub use classifier::{RelationshipClassifier, parse_relationship_response};
pub use segment::{find_imports, segment_class};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ClassificationFailure;

/// Relationship of a class to another class.
///
/// Variants are declared in ascending priority, so `Ord` is the merge order:
/// inheritance beats aggregation beats association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    Association,
    Aggregation,
    Inheritance,
}

impl RelationshipKind {
    pub fn priority(self) -> u8 {
        match self {
            RelationshipKind::Association => 1,
            RelationshipKind::Aggregation => 2,
            RelationshipKind::Inheritance => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelationshipKind::Association => "association",
            RelationshipKind::Aggregation => "aggregation",
            RelationshipKind::Inheritance => "inheritance",
        }
    }

    /// PlantUML line for `class` having this relationship to `target`.
    /// Inheritance points from the parent, the others from `class`.
    pub fn plantuml_line(self, class: &str, target: &str) -> String {
        match self {
            RelationshipKind::Inheritance => format!("{} <|-- {} : inheritance", target, class),
            RelationshipKind::Aggregation => format!("{} o-- {} : aggregation", class, target),
            RelationshipKind::Association => format!("{} --> {} : association", class, target),
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "association" => Ok(RelationshipKind::Association),
            "aggregation" => Ok(RelationshipKind::Aggregation),
            "inheritance" => Ok(RelationshipKind::Inheritance),
            other => Err(format!("unknown relationship kind '{}'", other)),
        }
    }
}

/// Target class -> strongest relationship seen so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationshipMap(BTreeMap<String, RelationshipKind>);

impl RelationshipMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation, keeping the higher-priority kind.
    pub fn record(&mut self, target: impl Into<String>, kind: RelationshipKind) {
        self.0.entry(target.into())
            .and_modify(|existing| *existing = (*existing).max(kind))
            .or_insert(kind);
    }

    /// Fold another partial result into this one.
    pub fn merge(&mut self, other: RelationshipMap) {
        for (target, kind) in other.0 {
            self.record(target, kind);
        }
    }

    pub fn get(&self, target: &str) -> Option<RelationshipKind> {
        self.0.get(target).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, RelationshipKind)> {
        self.0.iter().map(|(target, kind)| (target.as_str(), *kind))
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, RelationshipKind) -> bool) {
        self.0.retain(|target, kind| keep(target, *kind));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// PlantUML relationship lines for `class`, sorted by target
    pub fn plantuml_lines(&self, class: &str) -> Vec<String> {
        self.iter()
            .map(|(target, kind)| kind.plantuml_line(class, target))
            .collect()
    }
}

impl FromIterator<(String, RelationshipKind)> for RelationshipMap {
    fn from_iter<I: IntoIterator<Item = (String, RelationshipKind)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (target, kind) in iter {
            map.record(target, kind);
        }
        map
    }
}

/// Merge per-segment outcomes. Failed segments are logged and left out; the
/// result does not depend on arrival order.
pub fn merge_segments<I>(outcomes: I) -> RelationshipMap
where
    I: IntoIterator<Item = Result<RelationshipMap, ClassificationFailure>>,
{
    let mut merged = RelationshipMap::new();
    for outcome in outcomes {
        match outcome {
            Ok(partial) => merged.merge(partial),
            Err(failure) => warn!("Excluding segment from merge: {}", failure),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use RelationshipKind::*;

    fn map(entries: &[(&str, RelationshipKind)]) -> RelationshipMap {
        entries.iter().map(|(t, k)| (t.to_string(), *k)).collect()
    }

    fn failure(segment: usize) -> ClassificationFailure {
        ClassificationFailure {
            class_name: "Car".to_string(),
            segment,
            attempts: 5,
            reason: "no JSON object in reply".to_string(),
        }
    }

    #[test]
    fn test_priority_order() {
        assert!(Inheritance > Aggregation && Aggregation > Association);
        assert_eq!(Inheritance.priority(), 3);
        assert_eq!(Association.priority(), 1);
    }

    #[test]
    fn test_higher_priority_wins_in_either_order() {
        let forward = merge_segments(vec![Ok(map(&[("X", Association)])), Ok(map(&[("X", Inheritance)]))]);
        let backward = merge_segments(vec![Ok(map(&[("X", Inheritance)])), Ok(map(&[("X", Association)]))]);
        assert_eq!(forward.get("X"), Some(Inheritance));
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let partials = vec![
            map(&[("Engine", Association), ("Wheel", Aggregation)]),
            map(&[("Engine", Aggregation)]),
            map(&[("Vehicle", Inheritance), ("Wheel", Association)]),
            map(&[("Driver", Association)]),
        ];

        let expected = merge_segments(partials.iter().cloned().map(Ok));
        // every rotation and its reverse
        for shift in 0..partials.len() {
            let mut rotated = partials.clone();
            rotated.rotate_left(shift);
            assert_eq!(merge_segments(rotated.iter().cloned().map(Ok)), expected);
            rotated.reverse();
            assert_eq!(merge_segments(rotated.into_iter().map(Ok)), expected);
        }

        assert_eq!(expected.get("Engine"), Some(Aggregation));
        assert_eq!(expected.get("Wheel"), Some(Aggregation));
        assert_eq!(expected.get("Vehicle"), Some(Inheritance));
    }

    #[test]
    fn test_failed_segments_are_excluded() {
        let merged = merge_segments(vec![
            Err(failure(0)),
            Ok(map(&[("Engine", Aggregation)])),
            Err(failure(2)),
        ]);
        assert_eq!(merged, map(&[("Engine", Aggregation)]));
        assert!(merge_segments(vec![Err(failure(0))]).is_empty());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(" Inheritance ".parse::<RelationshipKind>(), Ok(Inheritance));
        assert!("composition".parse::<RelationshipKind>().is_err());
    }

    #[test]
    fn test_plantuml_lines() {
        let rels = map(&[("Animal", Inheritance), ("Engine", Aggregation), ("Road", Association)]);
        assert_eq!(rels.plantuml_lines("Car"), vec![
            "Animal <|-- Car : inheritance".to_string(),
            "Car o-- Engine : aggregation".to_string(),
            "Car --> Road : association".to_string(),
        ]);
    }

    #[test]
    fn test_serializes_as_lowercase_map() {
        let json = serde_json::to_string(&map(&[("Engine", Aggregation)])).unwrap();
        assert_eq!(json, r#"{"Engine":"aggregation"}"#);
    }
}
