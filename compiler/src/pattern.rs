// pattern.rs — Path-template matching over a state
//
// A path template is a sequence of node classes; a binding assigns one
// concrete node to each position such that consecutive nodes are joined by
// at least one edge. Matching rescans the current state on every call.
//
// Preconditions: none.
// Postconditions: each binding is yielded once, even across parallel edges.
// Failure modes: none (an empty iterator means no match).
// Side effects: none.

use tracing::trace;

use crate::graph::{NodeId, NodeKind, State};

/// Coarse node classification used by templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeClass {
    Access,
    MapEntry,
    MapExit,
    Tasklet,
    Stencil,
}

impl NodeClass {
    pub fn of(kind: &NodeKind) -> Self {
        match kind {
            NodeKind::Access { .. } => NodeClass::Access,
            NodeKind::MapEntry(_) => NodeClass::MapEntry,
            NodeKind::MapExit { .. } => NodeClass::MapExit,
            NodeKind::Tasklet(_) => NodeClass::Tasklet,
            NodeKind::Stencil(_) => NodeClass::Stencil,
        }
    }
}

/// A linear chain of node classes, e.g. `MapEntry -> Tasklet -> MapExit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    pub name: &'static str,
    pub steps: Vec<NodeClass>,
}

impl PathTemplate {
    pub fn path(name: &'static str, steps: &[NodeClass]) -> Self {
        PathTemplate {
            name,
            steps: steps.to_vec(),
        }
    }
}

/// Concrete nodes bound to template positions (roles), in template order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    pub nodes: Vec<NodeId>,
}

impl Binding {
    pub fn node(&self, role: usize) -> Option<NodeId> {
        self.nodes.get(role).copied()
    }
}

/// Enumerate every binding of `template` in `state`.
///
/// Bindings are produced lazily, one start node at a time, in node
/// identifier order.
pub fn match_pattern<'a>(
    state: &'a State,
    template: &'a PathTemplate,
) -> impl Iterator<Item = Binding> + 'a {
    let first = template.steps.first().copied();
    state
        .nodes()
        .filter(move |n| Some(NodeClass::of(&n.kind)) == first)
        .flat_map(move |start| extend(state, template, vec![start.id]))
        .inspect(move |binding| trace!(template = template.name, nodes = ?binding.nodes, "candidate"))
}

fn extend(state: &State, template: &PathTemplate, prefix: Vec<NodeId>) -> Vec<Binding> {
    let depth = prefix.len();
    if depth == template.steps.len() {
        return vec![Binding { nodes: prefix }];
    }
    let Some(&last) = prefix.last() else {
        return Vec::new();
    };
    let want = template.steps[depth];

    let mut next: Vec<NodeId> = state
        .out_edges(last)
        .map(|e| e.dst)
        .filter(|&dst| {
            state
                .node(dst)
                .is_some_and(|n| NodeClass::of(&n.kind) == want)
        })
        .collect();
    next.sort();
    next.dedup();

    next.into_iter()
        .flat_map(|dst| {
            let mut path = prefix.clone();
            path.push(dst);
            extend(state, template, path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataDesc;
    use crate::graph::{Memlet, NodeKind, Program};
    use crate::symbolic::Expr;

    fn map_template() -> PathTemplate {
        PathTemplate::path(
            "map",
            &[NodeClass::MapEntry, NodeClass::Tasklet, NodeClass::MapExit],
        )
    }

    fn program_with_maps(count: usize) -> Program {
        let mut program = Program::new("p");
        program.add_array("A", DataDesc::array(vec![Expr::sym("N")]));
        program.add_array("B", DataDesc::array(vec![Expr::sym("N")]));
        for k in 0..count {
            program
                .add_mapped_tasklet(
                    &format!("m{k}"),
                    &[("i", "1:N-2".parse().unwrap())],
                    &[
                        ("l", Memlet::simple("A", "i - 1").unwrap()),
                        ("r", Memlet::simple("A", "i + 1").unwrap()),
                    ],
                    "o = l + r",
                    &[("o", Memlet::simple("B", "i").unwrap())],
                )
                .unwrap();
        }
        program
    }

    #[test]
    fn parallel_edges_yield_one_binding() {
        let program = program_with_maps(1);
        let template = map_template();
        let bindings: Vec<_> = match_pattern(&program.state, &template).collect();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].nodes.len(), 3);
    }

    #[test]
    fn every_map_is_a_candidate() {
        let program = program_with_maps(3);
        let template = map_template();
        assert_eq!(match_pattern(&program.state, &template).count(), 3);
    }

    #[test]
    fn roles_follow_template_order() {
        let program = program_with_maps(1);
        let template = map_template();
        let binding = match_pattern(&program.state, &template).next().unwrap();
        let state = &program.state;
        let entry = binding.node(0).unwrap();
        assert!(state.node(entry).unwrap().as_map_entry().is_some());
        assert!(state.node(binding.node(1).unwrap()).unwrap().as_tasklet().is_some());
        assert_eq!(state.exit_node(entry), binding.node(2));
        assert_eq!(binding.node(3), None);
    }

    #[test]
    fn rescans_after_mutation() {
        let mut program = program_with_maps(2);
        let template = map_template();
        let first = match_pattern(&program.state, &template).next().unwrap();
        program.state.remove_node(first.nodes[1]);
        assert_eq!(match_pattern(&program.state, &template).count(), 1);
    }

    #[test]
    fn no_match_without_tasklet() {
        let mut program = Program::new("p");
        let scope = crate::graph::MapScope {
            label: "outer".into(),
            params: vec!["i".into()],
            range: vec!["0:9".parse().unwrap()],
        };
        let entry = program.state.add_node(NodeKind::MapEntry(scope));
        let exit = program.state.add_node(NodeKind::MapExit { entry });
        program.state.add_edge(entry, None, exit, None, None).unwrap();
        let template = map_template();
        assert_eq!(match_pattern(&program.state, &template).count(), 0);
    }
}
