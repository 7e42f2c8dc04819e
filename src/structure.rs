//! Ordering and consistency of a partition list.
//!
//! A recovered list is only trusted when no two records share a byte. These helpers number the
//! records for the on-disk table, detect conflicts and, when a list is first built, keep the
//! largest conflict-free subset active.

use alloc::{vec, vec::Vec};

use crate::{gpt, PartitionList, PartitionRecord, Status};

/// Numbers known, non-empty records 1..N in list order.
///
/// Other records keep whatever ordinal they had, so calling this twice gives the same result.
pub fn assign_order(list: &mut PartitionList) {
    let mut order = 1;

    for part in list.iter_mut() {
        if part.size > 0 && gpt::is_part_known(part) {
            part.order = order;
            order += 1;
        }
    }
}

/// Returns `true` if two records of `list` intersect, whatever their order in the list.
#[must_use]
pub fn detect_conflicts(list: &PartitionList) -> bool {
    list.sorted().is_overlapping()
}

/// Marks every record that does not overlap another one as primary.
///
/// Records involved in an overlap keep their status. If the remaining set still conflicts, all of
/// it is marked deleted instead.
pub fn rebuild_structure(list: &mut PartitionList) {
    let parts: Vec<&PartitionRecord> = list.iter().collect();
    let mut conflicting = vec![false; parts.len()];

    for (i, a) in parts.iter().enumerate() {
        for (j, b) in parts.iter().enumerate().skip(i + 1) {
            if a.overlaps(b) {
                conflicting[i] = true;
                conflicting[j] = true;
            }
        }
    }

    let kept: PartitionList = list
        .iter()
        .zip(&conflicting)
        .filter(|(_, conflict)| !**conflict)
        .map(|(part, _)| part.clone())
        .collect();

    let status = if detect_conflicts(&kept) {
        Status::Deleted
    } else {
        Status::Primary
    };

    for (part, conflict) in list.iter_mut().zip(conflicting) {
        if !conflict {
            part.status = status;
        }
    }
}

/// Toggles a record between primary and deleted.
pub fn next_status(partition: &mut PartitionRecord) {
    partition.status = match partition.status {
        Status::Primary => Status::Deleted,
        Status::Deleted => Status::Primary,
    };
}
