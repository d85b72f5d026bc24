use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use taskweave_core::error::{Result, TaskweaveError};
use taskweave_core::types::{Attributes, NodeId, TaskStatus};
use taskweave_graph::algo::{all_simple_paths, descendants};
use taskweave_graph::Graph;

use crate::kind::TaskKind;
use crate::session::SESSION_KEY;
use crate::workflow::{object_attr, parse_reference, Workflow, INPUT_KEY};

/// Node attribute naming the input collection a Mapper fans out.
pub const MAPPER_ARG_KEY: &str = "mapper_arg";

/// Collect attribute pointing back at the Mapper it pairs with.
pub const TO_MAPPER_KEY: &str = "to_mapper";

/// What a Mapper expansion did to the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct MapperExpansion {
    /// Number of mapped items, one lineage copy each.
    pub items: usize,
    /// The original lineage, ascending.
    pub lineage: Vec<NodeId>,
    /// Every node created for the extra copies, ascending.
    pub clones: Vec<NodeId>,
    /// The paired Collect, if any.
    pub collect: Option<NodeId>,
}

/// The Collect that declares `mapper` as its pairing, if any.
pub fn paired_collect(workflow: &Workflow, mapper: NodeId) -> Option<NodeId> {
    let paired: Vec<NodeId> = workflow
        .graph()
        .query_nodes_by(TO_MAPPER_KEY, &json!(mapper))
        .into_iter()
        .filter(|&id| matches!(workflow.kind(id), Ok(TaskKind::Collect)))
        .collect();
    if paired.len() > 1 {
        warn!(node_id = mapper, collects = ?paired, "Several Collect tasks pair with one Mapper, using the first");
    }
    paired.first().copied()
}

/// The task lineage a Mapper duplicates.
///
/// With a paired Collect, every node on a simple path between the two,
/// excluding both. Otherwise every descendant of the Mapper.
pub fn lineage(workflow: &Workflow, mapper: NodeId, collect: Option<NodeId>) -> Result<Vec<NodeId>> {
    let graph = workflow.graph();
    match collect {
        Some(collect) => {
            let members: BTreeSet<NodeId> = all_simple_paths(graph, mapper, collect)?
                .flatten()
                .filter(|&n| n != mapper && n != collect)
                .collect();
            Ok(members.into_iter().collect())
        }
        None => descendants(graph, mapper),
    }
}

/// Fan the Mapper's input collection out over copies of its lineage.
///
/// The original lineage handles the first item; every further item gets a
/// fresh copy with new ids, spliced in through the same boundary edges as
/// the original. Each lineage head of the i-th copy that is still ready
/// receives the i-th item plus every other input key of the Mapper.
///
/// The graph is fully rewired before this returns. The Mapper's own status
/// is left to the caller.
pub fn expand(workflow: &mut Workflow, mapper: NodeId, default_arg: &str) -> Result<MapperExpansion> {
    let arg = workflow
        .graph()
        .node_attr(mapper, MAPPER_ARG_KEY)?
        .and_then(Value::as_str)
        .unwrap_or(default_arg)
        .to_string();

    let input = workflow.get_input(mapper)?;
    let items = match input.get(&arg) {
        None => return Err(input_error(mapper, format!("mapper argument {} not in input", arg))),
        Some(Value::Array(items)) if items.is_empty() => {
            return Err(input_error(mapper, "no items to map"))
        }
        Some(Value::Array(items)) => items.clone(),
        Some(other) => {
            return Err(input_error(
                mapper,
                format!("mapper argument {} is not a sequence: {}", arg, other),
            ))
        }
    };

    let collect = paired_collect(workflow, mapper);
    let lineage = lineage(workflow, mapper, collect)?;
    if lineage.is_empty() {
        return Err(input_error(mapper, "no tasks connected to mapper"));
    }
    info!(node_id = mapper, items = items.len(), lineage = ?lineage, ?collect, "Mapping items");

    let graph = workflow.graph();
    let members: BTreeSet<NodeId> = lineage.iter().copied().collect();
    let template = graph.copy(lineage.iter().copied())?;
    let boundary = boundary_edges(graph, &members);
    let heads: Vec<NodeId> = graph
        .successors(mapper)?
        .into_iter()
        .filter(|n| members.contains(n))
        .collect();

    let mut copies: Vec<BTreeMap<NodeId, NodeId>> = vec![lineage.iter().map(|&n| (n, n)).collect()];
    let mut clones = Vec::new();
    let graph = workflow.graph_mut();
    for _ in 1..items.len() {
        let mapping = graph.merge_renumbered(&template);
        for (source, target, attrs) in &boundary {
            let source = mapping.get(source).copied().unwrap_or(*source);
            let target = mapping.get(target).copied().unwrap_or(*target);
            graph.add_edge(source, target, attrs.clone())?;
        }
        for &clone in mapping.values() {
            prepare_clone(graph, clone, &mapping)?;
            clones.push(clone);
        }
        copies.push(mapping);
    }
    clones.sort_unstable();

    for (item, copy) in items.iter().zip(&copies) {
        let payload = match item {
            Value::Object(map) => map.clone(),
            other => {
                let mut wrapped = Attributes::new();
                wrapped.insert(arg.clone(), other.clone());
                wrapped
            }
        };
        for head in &heads {
            let node = copy[head];
            if workflow.status(node)? != TaskStatus::Ready {
                continue;
            }
            let graph = workflow.graph_mut();
            let mut data = object_attr(graph.node(node)?, INPUT_KEY);
            data.extend(payload.clone());
            for (key, value) in &input {
                if *key != arg {
                    data.insert(key.clone(), value.clone());
                }
            }
            graph.set_node_attr(node, INPUT_KEY, Value::Object(data))?;
        }
    }

    Ok(MapperExpansion {
        items: items.len(),
        lineage,
        clones,
        collect,
    })
}

/// Edges with exactly one endpoint in `members`.
fn boundary_edges(graph: &Graph, members: &BTreeSet<NodeId>) -> Vec<(NodeId, NodeId, Attributes)> {
    graph
        .edges()
        .filter(|((a, b), _)| members.contains(a) != members.contains(b))
        .map(|((a, b), attrs)| (a, b, attrs.clone()))
        .collect()
}

/// Give a fresh clone its own identity and point its references at its
/// own copy of the lineage.
fn prepare_clone(graph: &mut Graph, clone: NodeId, mapping: &BTreeMap<NodeId, NodeId>) -> Result<()> {
    let node = graph.node_mut(clone)?;
    node.insert("task_id".into(), json!(Uuid::new_v4().to_string()));
    node.insert("status".into(), json!(TaskStatus::Ready.as_str()));
    node.remove(SESSION_KEY);
    // A nested Collect pairs with its own copy of the inner Mapper.
    let paired = node
        .get(TO_MAPPER_KEY)
        .and_then(Value::as_u64)
        .and_then(|old| mapping.get(&old).copied());
    if let Some(paired) = paired {
        node.insert(TO_MAPPER_KEY.into(), json!(paired));
    }
    if let Some(Value::Object(input)) = node.get_mut(INPUT_KEY) {
        for value in input.values_mut() {
            let rewritten = value
                .as_str()
                .and_then(parse_reference)
                .and_then(|(source, key)| mapping.get(&source).map(|new| format!("${}.{}", new, key)));
            if let Some(rewritten) = rewritten {
                *value = Value::String(rewritten);
            }
        }
    }
    Ok(())
}

fn input_error(node: NodeId, message: impl Into<String>) -> TaskweaveError {
    TaskweaveError::MapperInput {
        node,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskweave_core::config::AppConfig;

    fn task(wf: &mut Workflow, value: Value) -> NodeId {
        match value {
            Value::Object(map) => wf.add_task(map).unwrap(),
            _ => unreachable!(),
        }
    }

    /// mapper(1) -> prepare(2) -> score(3) -> collect(4)
    fn pipeline(items: Value) -> Workflow {
        let mut wf = Workflow::new(&AppConfig::default()).unwrap();
        let m = task(
            &mut wf,
            json!({"task_id": "m", "task_type": "Mapper", "input_data": {"mapper": items, "forcefield": "amber"}}),
        );
        let p = task(&mut wf, json!({"task_id": "p"}));
        let s = task(&mut wf, json!({"task_id": "s", "input_data": {"pose": "$2.pose"}}));
        let c = task(&mut wf, json!({"task_id": "c", "task_type": "Collect", "to_mapper": m}));
        wf.connect(m, p).unwrap();
        wf.connect(p, s).unwrap();
        wf.connect_with_mapping(s, c, [("energy", "score")]).unwrap();
        wf
    }

    #[test]
    fn test_three_items_three_lineages() {
        let mut wf = pipeline(json!(["a", "b", "c"]));
        let expansion = expand(&mut wf, 1, "mapper").unwrap();

        assert_eq!(expansion.items, 3);
        assert_eq!(expansion.lineage, vec![2, 3]);
        assert_eq!(expansion.collect, Some(4));
        assert_eq!(expansion.clones, vec![5, 6, 7, 8]);

        let graph = wf.graph();
        let heads = graph.successors(1).unwrap();
        assert_eq!(heads, vec![2, 5, 7]);
        assert_eq!(graph.predecessors(4).unwrap(), vec![3, 6, 8]);
        assert_eq!(graph.edge(6, 4).unwrap()["data_mapping"]["energy"], json!("score"));

        let assigned: Vec<Value> = heads
            .iter()
            .map(|&h| graph.node(h).unwrap()["input_data"]["mapper"].clone())
            .collect();
        assert_eq!(assigned, vec![json!("a"), json!("b"), json!("c")]);
        for &h in &heads {
            assert_eq!(graph.node(h).unwrap()["input_data"]["forcefield"], json!("amber"));
        }
    }

    #[test]
    fn test_clones_get_fresh_identity_and_rewired_references() {
        let mut wf = pipeline(json!([{"ligand": "x"}, {"ligand": "y"}]));
        expand(&mut wf, 1, "mapper").unwrap();
        let graph = wf.graph();

        assert_eq!(graph.node(6).unwrap()["input_data"]["pose"], json!("$5.pose"));
        assert_eq!(graph.node(3).unwrap()["input_data"]["pose"], json!("$2.pose"));
        assert_ne!(graph.node(5).unwrap()["task_id"], graph.node(2).unwrap()["task_id"]);
        assert_eq!(graph.node(5).unwrap()["status"], json!("ready"));
        // Mapping items that are already objects are merged as-is.
        assert_eq!(graph.node(5).unwrap()["input_data"]["ligand"], json!("y"));
        assert!(graph.node(5).unwrap()["input_data"].get("mapper").is_none());
    }

    #[test]
    fn test_single_item_adds_nothing() {
        let mut wf = pipeline(json!([1]));
        let expansion = expand(&mut wf, 1, "mapper").unwrap();
        assert!(expansion.clones.is_empty());
        assert_eq!(wf.graph().node_count(), 4);
        assert_eq!(wf.graph().node(2).unwrap()["input_data"]["mapper"], json!(1));
    }

    #[test]
    fn test_empty_or_missing_input_is_mapper_error() {
        let mut wf = pipeline(json!([]));
        assert!(matches!(
            expand(&mut wf, 1, "mapper"),
            Err(TaskweaveError::MapperInput { node: 1, .. })
        ));
        assert!(matches!(
            expand(&mut wf, 1, "structures"),
            Err(TaskweaveError::MapperInput { node: 1, .. })
        ));
        assert_eq!(wf.graph().node_count(), 4);
        assert_eq!(wf.status(1).unwrap(), TaskStatus::Ready);
    }

    #[test]
    fn test_nested_collect_pairs_with_cloned_inner_mapper() {
        // outer(1) -> inner(2) -> t(3) -> inner collect(4) -> outer collect(5)
        let mut wf = Workflow::new(&AppConfig::default()).unwrap();
        let outer = task(&mut wf, json!({"task_id": "outer", "task_type": "Mapper", "input_data": {"mapper": [[1, 2], [3, 4]]}}));
        let inner = task(&mut wf, json!({"task_id": "inner", "task_type": "Mapper"}));
        let t = task(&mut wf, json!({"task_id": "t"}));
        let inner_collect = task(&mut wf, json!({"task_id": "ic", "task_type": "Collect", "to_mapper": inner}));
        let outer_collect = task(&mut wf, json!({"task_id": "oc", "task_type": "Collect", "to_mapper": outer}));
        wf.connect(outer, inner).unwrap();
        wf.connect(inner, t).unwrap();
        wf.connect(t, inner_collect).unwrap();
        wf.connect(inner_collect, outer_collect).unwrap();

        let expansion = expand(&mut wf, outer, "mapper").unwrap();
        assert_eq!(expansion.lineage, vec![inner, t, inner_collect]);
        assert_eq!(expansion.clones, vec![6, 7, 8]);

        let graph = wf.graph();
        assert_eq!(graph.node(8).unwrap()["to_mapper"], json!(6));
        assert_eq!(graph.node(inner_collect).unwrap()["to_mapper"], json!(inner));
        assert_eq!(paired_collect(&wf, 6), Some(8));
        assert_eq!(paired_collect(&wf, inner), Some(inner_collect));
        assert_eq!(graph.predecessors(outer_collect).unwrap(), vec![inner_collect, 8]);
    }

    #[test]
    fn test_unpaired_mapper_clones_all_descendants() {
        let mut wf = Workflow::new(&AppConfig::default()).unwrap();
        let m = task(&mut wf, json!({"task_id": "m", "task_type": "Mapper", "mapper_arg": "xs", "input_data": {"xs": [1, 2]}}));
        let a = task(&mut wf, json!({"task_id": "a"}));
        let b = task(&mut wf, json!({"task_id": "b"}));
        wf.connect(m, a).unwrap();
        wf.connect(a, b).unwrap();

        let expansion = expand(&mut wf, m, "mapper").unwrap();
        assert_eq!(expansion.collect, None);
        assert_eq!(expansion.lineage, vec![a, b]);
        assert_eq!(expansion.clones.len(), 2);
        assert_eq!(wf.graph().node(4).unwrap()["input_data"]["xs"], json!(2));
        assert!(wf.graph().contains_edge(4, 5));
    }
}
