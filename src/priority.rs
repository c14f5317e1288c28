//! HTTP/2 priority tree
//!
//! Priority is not a separate structure: it is the parent/weight
//! relation carried on each stream in the table (RFC 7540 Section 5.3).
//! This module implements reprioritization over that relation: splice
//! reparenting, exclusive sibling adoption, and cycle prevention. Every
//! parent chain terminates at the root pseudo-stream.

use crate::error::{Error, Result};
use crate::frames::PrioritySpec;
use crate::stream::{StreamId, StreamTable, ROOT_STREAM_ID};

/// Apply a PRIORITY reprioritization to `stream_id`.
///
/// Unknown dependency targets are materialized as idle streams, as RFC
/// 7540 permits priority information for streams in any state.
pub fn reprioritize(table: &mut StreamTable, stream_id: StreamId, spec: &PrioritySpec) -> Result<()> {
    set_dependency(table, stream_id, spec.stream_dependency, spec.exclusive)?;
    if let Some(stream) = table.get_mut(stream_id) {
        stream.set_weight(spec.weight);
    }
    Ok(())
}

/// Reparent `stream_id` under `dependency_id`.
///
/// A stream depending on itself is rejected. When the dependency target
/// is a descendant of the stream, the target is first moved up to the
/// stream's former parent (RFC 7540 Section 5.3.3), so the parent chain
/// can never loop. With `exclusive`, every former child of the target
/// is adopted by the reprioritized stream.
pub fn set_dependency(
    table: &mut StreamTable,
    stream_id: StreamId,
    dependency_id: StreamId,
    exclusive: bool,
) -> Result<()> {
    if stream_id == dependency_id {
        return Err(Error::PriorityCycle(stream_id));
    }
    if table.get(stream_id).is_none() {
        return Err(Error::StreamNotFound(stream_id));
    }

    if dependency_id != ROOT_STREAM_ID && !table.contains(dependency_id) {
        table.insert_remote(dependency_id);
    }

    let old_parent = table.get(stream_id).map(|s| s.parent()).unwrap_or(ROOT_STREAM_ID);

    // Splice a dependent-on-descendant: the descendant takes the
    // stream's former place before the stream moves under it.
    if is_ancestor(table, stream_id, dependency_id) {
        if let Some(dep) = table.get_mut(dependency_id) {
            dep.set_parent(old_parent);
        }
    }

    // Former children of the target, collected before the stream moves
    // so the stream itself is never adopted by itself.
    let adopted: Vec<StreamId> = if exclusive {
        table
            .ids()
            .into_iter()
            .filter(|&id| {
                id != stream_id
                    && id != dependency_id
                    && id != ROOT_STREAM_ID
                    && table.get(id).map(|s| s.parent()) == Some(dependency_id)
            })
            .collect()
    } else {
        Vec::new()
    };

    if let Some(stream) = table.get_mut(stream_id) {
        stream.set_parent(dependency_id);
    }

    for id in adopted {
        if let Some(sibling) = table.get_mut(id) {
            sibling.set_parent(stream_id);
        }
    }

    debug_assert!(!is_ancestor(table, stream_id, stream_id) || stream_id == ROOT_STREAM_ID);
    Ok(())
}

/// Whether `ancestor` appears on `stream_id`'s parent chain (strictly
/// above it). The chain stops at the root, which is its own parent.
pub fn is_ancestor(table: &StreamTable, ancestor: StreamId, stream_id: StreamId) -> bool {
    let mut current = stream_id;
    while current != ROOT_STREAM_ID {
        let parent = match table.get(current) {
            Some(s) => s.parent(),
            None => return false,
        };
        if parent == ancestor {
            return true;
        }
        current = parent;
    }
    ancestor == ROOT_STREAM_ID && stream_id != ROOT_STREAM_ID
}
