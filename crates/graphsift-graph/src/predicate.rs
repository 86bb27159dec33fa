use crate::snapshot::GraphSnapshot;
use crate::Selection;
use graphsift_core::{Edge, EntityKind, Node, Operator, Predicate};
use regex::Regex;
use std::borrow::Cow;

/// Anything a predicate can read a named value from.
pub trait PropertySource {
    /// `properties[name]` first, then the reserved top-level fields.
    fn resolve(&self, name: &str) -> Option<Cow<'_, str>>;
}

impl PropertySource for Node {
    fn resolve(&self, name: &str) -> Option<Cow<'_, str>> {
        if let Some(value) = self.properties.get(name) {
            return Some(Cow::Borrowed(value.as_str()));
        }
        match name {
            "id" => Some(Cow::Borrowed(self.id.as_str())),
            "labels" => Some(Cow::Owned(self.joined_labels())),
            _ => None,
        }
    }
}

impl PropertySource for Edge {
    fn resolve(&self, name: &str) -> Option<Cow<'_, str>> {
        if let Some(value) = self.properties.get(name) {
            return Some(Cow::Borrowed(value.as_str()));
        }
        match name {
            "id" => Some(Cow::Borrowed(self.id.as_str())),
            "label" | "type" => Some(Cow::Borrowed(self.label.as_str())),
            "from" => Some(Cow::Borrowed(self.from.as_str())),
            "to" => Some(Cow::Borrowed(self.to.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPattern {
    pub kind: EntityKind,
    pub property: String,
    pub pattern: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredicateReport {
    pub invalid_patterns: Vec<InvalidPattern>,
}

enum Matcher {
    Equals(String),
    Contains(String),
    /// `None` when the pattern failed to compile: matches nothing.
    Regex(Option<Regex>),
    Exists,
    NotExists,
    /// `None` when the predicate value is not numeric: matches nothing.
    Greater(Option<f64>),
    Less(Option<f64>),
}

struct CompiledPredicate<'a> {
    property: &'a str,
    matcher: Matcher,
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

impl<'a> CompiledPredicate<'a> {
    fn compile(
        predicate: &'a Predicate,
        kind: EntityKind,
        report: &mut PredicateReport,
    ) -> Self {
        let matcher = match predicate.operator {
            Operator::Equals => Matcher::Equals(predicate.value.clone()),
            Operator::Contains => Matcher::Contains(predicate.value.to_lowercase()),
            Operator::Regex => match Regex::new(&predicate.value) {
                Ok(re) => Matcher::Regex(Some(re)),
                Err(err) => {
                    tracing::warn!(
                        "Invalid regex {:?} on {} property {}: {}",
                        predicate.value,
                        kind.as_str(),
                        predicate.property,
                        err
                    );
                    report.invalid_patterns.push(InvalidPattern {
                        kind,
                        property: predicate.property.clone(),
                        pattern: predicate.value.clone(),
                        error: err.to_string(),
                    });
                    Matcher::Regex(None)
                }
            },
            Operator::Exists => Matcher::Exists,
            Operator::NotExists => Matcher::NotExists,
            Operator::Greater => Matcher::Greater(parse_number(&predicate.value)),
            Operator::Less => Matcher::Less(parse_number(&predicate.value)),
        };
        Self {
            property: &predicate.property,
            matcher,
        }
    }

    fn matches<S: PropertySource>(&self, item: &S) -> bool {
        let value = item.resolve(self.property);
        match (&self.matcher, value.as_deref()) {
            (Matcher::Exists, value) => value.is_some(),
            (Matcher::NotExists, value) => value.is_none(),
            (_, None) => false,
            (Matcher::Equals(expected), Some(v)) => v == expected.as_str(),
            (Matcher::Contains(needle), Some(v)) => v.to_lowercase().contains(needle.as_str()),
            (Matcher::Regex(re), Some(v)) => re.as_ref().is_some_and(|re| re.is_match(v)),
            (Matcher::Greater(bound), Some(v)) => match (parse_number(v), bound) {
                (Some(v), Some(bound)) => v > *bound,
                _ => false,
            },
            (Matcher::Less(bound), Some(v)) => match (parse_number(v), bound) {
                (Some(v), Some(bound)) => v < *bound,
                _ => false,
            },
        }
    }
}

fn compile_enabled<'a>(
    predicates: &'a [Predicate],
    kind: EntityKind,
    report: &mut PredicateReport,
) -> Vec<CompiledPredicate<'a>> {
    predicates
        .iter()
        .filter(|p| p.enabled)
        .map(|p| CompiledPredicate::compile(p, kind, report))
        .collect()
}

pub struct PropertyPredicateFilter;

impl PropertyPredicateFilter {
    /// Intersect `candidate` with the AND of all enabled predicates, then drop
    /// every edge that lost an endpoint.
    ///
    /// Each regex is compiled once per call, so an invalid pattern shows up
    /// once in the report no matter how many items it is tested against.
    pub fn apply(
        snapshot: &GraphSnapshot,
        candidate: &Selection,
        node_predicates: &[Predicate],
        edge_predicates: &[Predicate],
    ) -> (Selection, PredicateReport) {
        let mut report = PredicateReport::default();
        let node_matchers = compile_enabled(node_predicates, EntityKind::Node, &mut report);
        let edge_matchers = compile_enabled(edge_predicates, EntityKind::Edge, &mut report);

        let nodes = candidate
            .nodes
            .iter()
            .filter(|id| {
                snapshot
                    .node(id)
                    .is_some_and(|node| node_matchers.iter().all(|m| m.matches(node)))
            })
            .cloned()
            .collect();
        let edges = candidate
            .edges
            .iter()
            .filter(|id| {
                snapshot
                    .edge(id)
                    .is_some_and(|edge| edge_matchers.iter().all(|m| m.matches(edge)))
            })
            .cloned()
            .collect();

        let mut selection = Selection { nodes, edges };
        selection.retain_connected(snapshot);

        tracing::debug!(
            nodes = selection.nodes.len(),
            edges = selection.edges.len(),
            "predicate filter applied"
        );
        (selection, report)
    }

    /// Evaluate a single predicate against one item, ignoring `enabled`.
    pub fn matches<S: PropertySource>(item: &S, predicate: &Predicate) -> bool {
        let mut report = PredicateReport::default();
        CompiledPredicate::compile(predicate, EntityKind::Node, &mut report).matches(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphsift_core::{EdgeId, NodeId};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn node_ids(selection: &Selection) -> Vec<&str> {
        selection.nodes.iter().map(NodeId::as_str).collect()
    }

    fn named(names: &[(&str, &str)]) -> GraphSnapshot {
        GraphSnapshot::load(
            names
                .iter()
                .map(|(id, name)| Node::new(*id).with_property("name", *name)),
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_regex_anchors() {
        let snapshot = named(&[("1", "foobar"), ("2", "barfoo")]);
        let (out, report) = PropertyPredicateFilter::apply(
            &snapshot,
            &Selection::everything(&snapshot),
            &[Predicate::new("name", Operator::Regex, "^foo.*")],
            &[],
        );
        assert_eq!(node_ids(&out), vec!["1"]);
        assert!(report.invalid_patterns.is_empty());
    }

    #[test]
    fn test_malformed_regex_matches_nothing_and_is_reported_once() {
        let snapshot = named(&[("1", "foobar"), ("2", "barfoo"), ("3", "([")]);
        let (out, report) = PropertyPredicateFilter::apply(
            &snapshot,
            &Selection::everything(&snapshot),
            &[Predicate::new("name", Operator::Regex, "([")],
            &[],
        );
        assert!(out.nodes.is_empty());
        assert_eq!(report.invalid_patterns.len(), 1);
        assert_eq!(report.invalid_patterns[0].pattern, "([");
        assert_eq!(report.invalid_patterns[0].kind, EntityKind::Node);
    }

    #[test]
    fn test_disabled_predicates_are_ignored() {
        let snapshot = named(&[("1", "alpha"), ("2", "beta")]);
        let (out, report) = PropertyPredicateFilter::apply(
            &snapshot,
            &Selection::everything(&snapshot),
            &[
                Predicate::new("name", Operator::Equals, "alpha"),
                Predicate::new("name", Operator::Regex, "([").disabled(),
            ],
            &[],
        );
        assert_eq!(node_ids(&out), vec!["1"]);
        assert!(report.invalid_patterns.is_empty());
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let node = Node::new("n").with_property("title", "Hello World");
        assert!(PropertyPredicateFilter::matches(
            &node,
            &Predicate::new("title", Operator::Contains, "WORLD")
        ));
        assert!(!PropertyPredicateFilter::matches(
            &node,
            &Predicate::new("title", Operator::Contains, "moon")
        ));
    }

    #[test]
    fn test_reserved_fields() {
        let node = Node::new("n1").with_label("Person").with_label("Agent");
        assert!(PropertyPredicateFilter::matches(
            &node,
            &Predicate::new("id", Operator::Equals, "n1")
        ));
        assert!(PropertyPredicateFilter::matches(
            &node,
            &Predicate::new("labels", Operator::Equals, "Agent,Person")
        ));

        let shadowed = Node::new("n2").with_property("id", "custom");
        assert!(PropertyPredicateFilter::matches(
            &shadowed,
            &Predicate::new("id", Operator::Equals, "custom")
        ));

        let edge = Edge::new("e1", "a", "b", "INF_REL_X");
        assert!(PropertyPredicateFilter::matches(
            &edge,
            &Predicate::new("type", Operator::Contains, "inf_rel")
        ));
        assert!(PropertyPredicateFilter::matches(
            &edge,
            &Predicate::new("from", Operator::Equals, "a")
        ));
    }

    #[test]
    fn test_missing_values() {
        let node = Node::new("n");
        for op in [
            Operator::Equals,
            Operator::Contains,
            Operator::Regex,
            Operator::Greater,
            Operator::Less,
        ] {
            assert!(
                !PropertyPredicateFilter::matches(&node, &Predicate::new("age", op, "")),
                "{op:?}"
            );
        }
        assert!(!PropertyPredicateFilter::matches(
            &node,
            &Predicate::new("age", Operator::Exists, "")
        ));
        assert!(PropertyPredicateFilter::matches(
            &node,
            &Predicate::new("age", Operator::NotExists, "")
        ));
    }

    #[test]
    fn test_numeric_comparisons() {
        let node = Node::new("n").with_property("age", "42");
        let text = Node::new("t").with_property("age", "forty");
        let check = |item: &Node, op: Operator, value: &str| {
            PropertyPredicateFilter::matches(item, &Predicate::new("age", op, value))
        };
        assert!(check(&node, Operator::Greater, "41.5"));
        assert!(!check(&node, Operator::Greater, "42"));
        assert!(check(&node, Operator::Less, "100"));
        assert!(!check(&text, Operator::Less, "100"));
        assert!(!check(&node, Operator::Less, "lots"));
    }

    #[test]
    fn test_edges_lose_filtered_endpoints() {
        let snapshot = GraphSnapshot::load(
            vec![
                Node::new("a").with_property("keep", "y"),
                Node::new("b").with_property("keep", "y"),
                Node::new("c"),
            ],
            vec![
                Edge::new("ab", "a", "b", "R").with_property("w", "1"),
                Edge::new("bc", "b", "c", "R"),
                Edge::new("ba", "b", "a", "R"),
            ],
        )
        .unwrap();
        let (out, _) = PropertyPredicateFilter::apply(
            &snapshot,
            &Selection::everything(&snapshot),
            &[Predicate::new("keep", Operator::Exists, "")],
            &[Predicate::new("w", Operator::Equals, "1")],
        );
        assert_eq!(node_ids(&out), vec!["a", "b"]);
        assert_eq!(out.edges, BTreeSet::from([EdgeId::from("ab")]));
    }

    fn arb_snapshot() -> impl Strategy<Value = GraphSnapshot> {
        (
            proptest::collection::vec((0u8..5, 0u8..5), 1..12),
            proptest::collection::vec((0usize..12, 0usize..12), 0..20),
        )
            .prop_map(|(props, pairs)| {
                let nodes: Vec<Node> = props
                    .iter()
                    .enumerate()
                    .map(|(i, (a, b))| {
                        Node::new(format!("n{i}"))
                            .with_property("a", a.to_string())
                            .with_property("b", b.to_string())
                    })
                    .collect();
                let n = nodes.len();
                let edges: Vec<Edge> = pairs
                    .into_iter()
                    .enumerate()
                    .map(|(i, (f, t))| {
                        Edge::new(format!("e{i}"), format!("n{}", f % n), format!("n{}", t % n), "R")
                    })
                    .collect();
                GraphSnapshot::load(nodes, edges).unwrap()
            })
    }

    proptest! {
        #[test]
        fn prop_and_is_intersection(snapshot in arb_snapshot(), a in 0u8..5, b in 0u8..5) {
            let all = Selection::everything(&snapshot);
            let p1 = Predicate::new("a", Operator::Less, a.to_string());
            let p2 = Predicate::new("b", Operator::Greater, b.to_string());

            let (both, _) = PropertyPredicateFilter::apply(&snapshot, &all, &[p1.clone(), p2.clone()], &[]);
            let (only1, _) = PropertyPredicateFilter::apply(&snapshot, &all, &[p1.clone()], &[]);
            let (only2, _) = PropertyPredicateFilter::apply(&snapshot, &all, &[p2.clone()], &[]);
            let expected: BTreeSet<_> = only1.nodes.intersection(&only2.nodes).cloned().collect();
            prop_assert_eq!(&both.nodes, &expected);

            let (with_disabled, _) =
                PropertyPredicateFilter::apply(&snapshot, &all, &[p1, p2.disabled()], &[]);
            prop_assert_eq!(with_disabled, only1);
        }

        #[test]
        fn prop_no_dangling_edges(snapshot in arb_snapshot(), a in 0u8..5) {
            let all = Selection::everything(&snapshot);
            let (out, _) = PropertyPredicateFilter::apply(
                &snapshot,
                &all,
                &[Predicate::new("a", Operator::Greater, a.to_string())],
                &[],
            );
            for id in &out.edges {
                let edge = snapshot.edge(id).unwrap();
                prop_assert!(out.nodes.contains(&edge.from));
                prop_assert!(out.nodes.contains(&edge.to));
            }
        }
    }
}
