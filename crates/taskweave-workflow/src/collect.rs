use serde_json::Value;
use tracing::{debug, error, info};

use taskweave_core::error::Result;
use taskweave_core::traits::ReducerFn;
use taskweave_core::types::{Attributes, NodeId, TaskStatus};

use crate::workflow::{object_attr, Workflow, DATA_MAPPING_KEY, OUTPUT_KEY};

/// What a Collect evaluation decided.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectOutcome {
    /// An ancestor failed or was aborted; the Collect failed with it.
    Failed { failed: Vec<NodeId> },
    /// Every ancestor settled and the reducer ran.
    Completed { gathered: usize },
    /// Some ancestors are still in progress; the Collect stays ready.
    Pending { pending: usize },
}

/// Evaluate a Collect task against its ancestors in the full graph.
///
/// Ancestors are visited in ascending id order. Each ancestor's output is
/// renamed through the `data_mapping` of its edge before the reducer sees
/// it. The reducer result is merged into the Collect's output.
pub fn run_collect(workflow: &mut Workflow, id: NodeId, reducer: &ReducerFn) -> Result<CollectOutcome> {
    let ancestors = workflow.graph().predecessors(id)?;

    let mut failed = Vec::new();
    let mut pending = 0;
    for &ancestor in &ancestors {
        let status = workflow.status(ancestor)?;
        if status.is_failure() {
            failed.push(ancestor);
        } else if !status.is_settled() {
            pending += 1;
        }
    }

    if !failed.is_empty() {
        error!(node_id = id, ?failed, "Failed parent tasks detected, unable to collect all output");
        workflow.set_status(id, TaskStatus::Failed)?;
        return Ok(CollectOutcome::Failed { failed });
    }

    if pending > 0 {
        debug!(node_id = id, pending, "Not all output available yet");
        if workflow.status(id)? != TaskStatus::Ready {
            workflow.set_status(id, TaskStatus::Ready)?;
        }
        return Ok(CollectOutcome::Pending { pending });
    }

    info!(node_id = id, parents = ancestors.len(), "Output of parent tasks available, collecting");
    let graph = workflow.graph();
    let mut gathered = Vec::with_capacity(ancestors.len());
    for &ancestor in &ancestors {
        let mapping = object_attr(graph.edge(ancestor, id)?, DATA_MAPPING_KEY);
        let output = object_attr(graph.node(ancestor)?, OUTPUT_KEY);
        gathered.push(rename(output, &mapping));
    }

    let count = gathered.len();
    let reduced = reducer(gathered)?;
    workflow.merge_output(id, reduced)?;
    workflow.set_status(id, TaskStatus::Completed)?;
    Ok(CollectOutcome::Completed { gathered: count })
}

fn rename(output: Attributes, mapping: &Attributes) -> Attributes {
    output
        .into_iter()
        .map(|(key, value)| {
            let renamed = mapping
                .get(&key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(key);
            (renamed, value)
        })
        .collect()
}
