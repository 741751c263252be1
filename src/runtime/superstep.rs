//! Concurrent execution of one cohort.
//!
//! One task per dispatched step; results are re-ordered by dispatch index
//! after the join, so the merge phase sees dispatch order no matter how the
//! tasks interleave.

use tokio::task::{JoinError, JoinSet};

use crate::executor::StepExecutor;
use crate::types::StepResult;
use crate::workflow::Step;

pub(crate) async fn run_cohort(
    executor: &StepExecutor,
    steps: &[Step],
) -> Result<Vec<StepResult>, JoinError> {
    let mut set: JoinSet<(usize, StepResult)> = JoinSet::new();
    for (idx, step) in steps.iter().enumerate() {
        let executor = executor.clone();
        let step = step.clone();
        set.spawn(async move { (idx, executor.execute(&step).await) });
    }

    let mut slots: Vec<Option<StepResult>> = (0..steps.len()).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        let (idx, result) = joined?;
        slots[idx] = Some(result);
    }
    Ok(slots
        .into_iter()
        .map(|slot| slot.expect("every dispatched step reports a result"))
        .collect())
}
