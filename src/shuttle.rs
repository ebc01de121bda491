//! Rebuilding plans bottom up.
//!
//! Nodes are immutable, so changing a node deep in a plan means copying every node above it over
//! the new inputs. These functions do that once per node, so shared inputs stay shared.

use std::collections::{HashMap, HashSet};

use anyhow::ensure;

use crate::error::{OptError, OptResult};
use crate::plan::{RelCluster, RelId};

/// Visits every node under `root` after its inputs, copying nodes whose inputs changed. `f` sees
/// each node over its final inputs and may return a replacement for it, which must have a
/// compatible row type.
pub fn transform_bottom_up<F>(cluster: &mut RelCluster, root: RelId, mut f: F) -> OptResult<RelId>
where
    F: FnMut(&mut RelCluster, RelId) -> OptResult<Option<RelId>>,
{
    let mut done = HashMap::new();
    visit(cluster, root, &mut f, &mut done)
}

fn visit<F>(
    cluster: &mut RelCluster,
    rel: RelId,
    f: &mut F,
    done: &mut HashMap<RelId, RelId>,
) -> OptResult<RelId>
where
    F: FnMut(&mut RelCluster, RelId) -> OptResult<Option<RelId>>,
{
    if let Some(result) = done.get(&rel) {
        return Ok(*result);
    }
    let inputs = cluster.inputs(rel).to_vec();
    let mut new_inputs = Vec::with_capacity(inputs.len());
    for input in inputs {
        new_inputs.push(visit(cluster, input, f, done)?);
    }
    let traits = cluster.traits(rel).clone();
    let copied = cluster.copy(rel, &traits, &new_inputs)?;
    let result = match f(cluster, copied)? {
        Some(replacement) => {
            check_row_types(cluster, copied, replacement)?;
            replacement
        }
        None => copied,
    };
    done.insert(rel, result);
    Ok(result)
}

fn check_row_types(cluster: &RelCluster, before: RelId, after: RelId) -> OptResult<()> {
    let (old, new) = (cluster.row_type(before), cluster.row_type(after));
    ensure!(
        old.is_compatible(new),
        OptError::RowTypeMismatch {
            rel: before,
            before: old.to_string(),
            after: new.to_string(),
        }
    );
    Ok(())
}

/// Replaces every use of `target` under `root` with `replacement`.
pub fn replace(
    cluster: &mut RelCluster,
    root: RelId,
    target: RelId,
    replacement: RelId,
) -> OptResult<RelId> {
    transform_bottom_up(cluster, root, |_, rel| {
        Ok((rel == target).then(|| replacement))
    })
}

/// Replaces each subset under `root` by its best member, or its first member if none was chosen.
///
/// Fails if a subset is empty or reaches itself through the members chosen.
pub fn strip_subsets(cluster: &mut RelCluster, root: RelId) -> OptResult<RelId> {
    let mut active = HashSet::new();
    let mut done = HashMap::new();
    strip(cluster, root, &mut active, &mut done)
}

fn strip(
    cluster: &mut RelCluster,
    rel: RelId,
    active: &mut HashSet<RelId>,
    done: &mut HashMap<RelId, RelId>,
) -> OptResult<RelId> {
    if let Some(result) = done.get(&rel) {
        return Ok(*result);
    }
    if let Some(subset) = cluster.operator(rel).as_subset() {
        let member = subset
            .best_or_original()
            .ok_or_else(|| OptError::InvalidRel(rel, "empty subset".to_string()))?;
        ensure!(
            active.insert(rel),
            OptError::InvalidRel(rel, "subset reaches itself".to_string())
        );
        let result = strip(cluster, member, active, done)?;
        active.remove(&rel);
        done.insert(rel, result);
        return Ok(result);
    }

    let inputs = cluster.inputs(rel).to_vec();
    let mut new_inputs = Vec::with_capacity(inputs.len());
    for input in inputs {
        new_inputs.push(strip(cluster, input, active, done)?);
    }
    let traits = cluster.traits(rel).clone();
    let result = cluster.copy(rel, &traits, &new_inputs)?;
    done.insert(rel, result);
    Ok(result)
}
