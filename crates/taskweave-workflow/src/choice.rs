use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

use taskweave_core::error::Result;
use taskweave_core::types::{NodeId, TaskStatus};

use crate::workflow::Workflow;

/// Result of a Choice decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceOutcome {
    pub chosen: Option<NodeId>,
    pub disabled: Vec<NodeId>,
}

/// Pick one successor uniformly at random and disable the others.
///
/// The Choice passes its input through as output and completes.
pub fn run_choice<R>(workflow: &mut Workflow, id: NodeId, rng: &mut R) -> Result<ChoiceOutcome>
where
    R: Rng + ?Sized,
{
    let successors = workflow.graph().successors(id)?;
    let chosen = successors.choose(rng).copied();
    let disabled: Vec<NodeId> = successors
        .iter()
        .copied()
        .filter(|&s| Some(s) != chosen)
        .collect();

    info!(node_id = id, ?chosen, options = successors.len(), "Choice made");
    for &sibling in &disabled {
        workflow.set_status(sibling, TaskStatus::Disabled)?;
    }

    let input = workflow.get_input(id)?;
    workflow.set_output(id, input)?;
    workflow.set_status(id, TaskStatus::Completed)?;

    Ok(ChoiceOutcome { chosen, disabled })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::{json, Value};
    use taskweave_core::config::AppConfig;

    fn task(wf: &mut Workflow, value: Value) -> NodeId {
        match value {
            Value::Object(map) => wf.add_task(map).unwrap(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_one_branch_survives() {
        let mut wf = Workflow::new(&AppConfig::default()).unwrap();
        let choice = task(&mut wf, json!({"task_id": "c", "task_type": "Choice", "input_data": {"k": 1}}));
        let branches: Vec<NodeId> = (0..3)
            .map(|i| task(&mut wf, json!({"task_id": format!("b{}", i)})))
            .collect();
        for &b in &branches {
            wf.connect(choice, b).unwrap();
        }

        let mut rng = StdRng::seed_from_u64(11);
        let outcome = run_choice(&mut wf, choice, &mut rng).unwrap();
        let chosen = outcome.chosen.unwrap();
        assert!(branches.contains(&chosen));
        assert_eq!(outcome.disabled.len(), 2);
        assert_eq!(wf.status(chosen).unwrap(), TaskStatus::Ready);
        for d in outcome.disabled {
            assert_eq!(wf.status(d).unwrap(), TaskStatus::Disabled);
        }
        assert_eq!(wf.status(choice).unwrap(), TaskStatus::Completed);
        assert_eq!(wf.output(choice).unwrap()["k"], json!(1));
    }

    #[test]
    fn test_same_seed_same_choice() {
        let build = || {
            let mut wf = Workflow::new(&AppConfig::default()).unwrap();
            let c = task(&mut wf, json!({"task_id": "c", "task_type": "Choice"}));
            for i in 0..5 {
                let b = task(&mut wf, json!({"task_id": format!("b{}", i)}));
                wf.connect(c, b).unwrap();
            }
            (wf, c)
        };
        let (mut a, ca) = build();
        let (mut b, cb) = build();
        let first = run_choice(&mut a, ca, &mut StdRng::seed_from_u64(3)).unwrap();
        let second = run_choice(&mut b, cb, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_successors() {
        let mut wf = Workflow::new(&AppConfig::default()).unwrap();
        let c = task(&mut wf, json!({"task_id": "c", "task_type": "Choice"}));
        let outcome = run_choice(&mut wf, c, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(outcome.chosen, None);
        assert!(outcome.disabled.is_empty());
    }
}
