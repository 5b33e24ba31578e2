//! Human-readable rendering of redo records for diagnostic tooling
//!
//! Every record is printable from its decoded form alone. All array-carrying
//! kinds share one parameterized printing helper; the per-element formatters
//! cover plain integers, "a→b" redirect pairs, and relation ids.

use std::fmt::Write;

use crate::page::RelationId;

use super::record::{PostingUpdate, RedoRecord};

/// Appends `name: e1, e2, ...` using the given per-element formatter.
/// Shared by every record kind that carries arrays.
fn append_array<T>(out: &mut String, name: &str, elems: &[T], fmt_elem: impl Fn(&T) -> String) {
    let _ = write!(out, "; {}:", name);
    for (i, elem) in elems.iter().enumerate() {
        let sep = if i == 0 { " " } else { ", " };
        let _ = write!(out, "{}{}", sep, fmt_elem(elem));
    }
}

/// Plain unsigned integer element.
fn uint16_elem(v: &u16) -> String {
    v.to_string()
}

/// "a→b" redirect pair element.
fn redirect_elem(pair: &(u16, u16)) -> String {
    format!("{}→{}", pair.0, pair.1)
}

/// Relation id element.
fn relid_elem(rel: &RelationId) -> String {
    format!("rel {}", rel)
}

fn append_update_detail(out: &mut String, updated: &[PostingUpdate]) {
    // Summary first: surviving slot → number of row pointers removed from it
    let pairs: Vec<(u16, u16)> = updated
        .iter()
        .map(|u| (u.slot, u.deleted_row_indexes.len() as u16))
        .collect();
    append_array(out, "updated", &pairs, redirect_elem);
    // Then the nested removed-row-index lists, one per update
    for update in updated {
        append_array(
            out,
            &format!("update {} rows", update.slot),
            &update.deleted_row_indexes,
            uint16_elem,
        );
    }
}

/// Renders one record as a single diagnostic line (without the kind name;
/// callers print `record.kind().name()` first).
pub fn describe(record: &RedoRecord) -> String {
    let mut out = String::new();
    match record {
        RedoRecord::Insert { slot, .. } => {
            let _ = write!(out, "off: {}", slot);
        }
        RedoRecord::Split {
            level,
            first_right_slot,
            new_item_slot,
            posting_split_offset,
            ..
        } => {
            let _ = write!(
                out,
                "level: {}, firstrightoff: {}, newitemoff: {}, postingoff: {}",
                level, first_right_slot, new_item_slot, posting_split_offset
            );
        }
        RedoRecord::Dedup { n_intervals } => {
            let _ = write!(out, "nintervals: {}", n_intervals);
        }
        RedoRecord::Vacuum { deleted, updated } => {
            let _ = write!(
                out,
                "ndeleted: {}, nupdated: {}",
                deleted.len(),
                updated.len()
            );
            append_array(&mut out, "deleted", deleted, uint16_elem);
            append_update_detail(&mut out, updated);
        }
        RedoRecord::Delete {
            conflict_horizon,
            is_catalog_rel,
            deleted,
            updated,
        } => {
            let _ = write!(
                out,
                "conflict horizon: {}, ndeleted: {}, nupdated: {}, isCatalogRel: {}",
                conflict_horizon,
                deleted.len(),
                updated.len(),
                if *is_catalog_rel { 'T' } else { 'F' }
            );
            append_array(&mut out, "deleted", deleted, uint16_elem);
            append_update_detail(&mut out, updated);
        }
        RedoRecord::MarkPageHalfDead {
            grandparent,
            leaf,
            left_sibling,
            right_sibling,
        } => {
            let _ = write!(
                out,
                "grandparent: {}, leaf: {}, left: {}, right: {}",
                grandparent, leaf, left_sibling, right_sibling
            );
        }
        RedoRecord::UnlinkPage {
            left_sibling,
            right_sibling,
            level,
            safe_xid,
            leaf_left_sibling,
            leaf_right_sibling,
            leaf_top_parent,
            ..
        } => {
            let _ = write!(
                out,
                "left: {}, right: {}, level: {}, safexid: {}:{}, leafleft: {}, leafright: {}, leaftopparent: {}",
                left_sibling,
                right_sibling,
                level,
                safe_xid.epoch,
                safe_xid.xid,
                leaf_left_sibling,
                leaf_right_sibling,
                leaf_top_parent
            );
        }
        RedoRecord::NewRoot { level } => {
            let _ = write!(out, "level: {}", level);
        }
        RedoRecord::ReusePage {
            locator,
            conflict_horizon,
            is_catalog_rel,
        } => {
            let _ = write!(
                out,
                "rel: {}/{}/{}, snapshotConflictHorizon: {}:{}, isCatalogRel: {}",
                locator.space,
                locator.database,
                locator.relation,
                conflict_horizon.epoch,
                conflict_horizon.xid,
                if *is_catalog_rel { 'T' } else { 'F' }
            );
        }
        RedoRecord::MetaCleanup {
            last_cleanup_deleted_pages,
        } => {
            let _ = write!(
                out,
                "last_cleanup_num_delpages: {}",
                last_cleanup_deleted_pages
            );
        }
    }
    out
}

/// Renders the set of relations touched by a log, for summary output.
pub fn describe_relations(relations: &[RelationId]) -> String {
    let mut out = String::new();
    append_array(&mut out, "relations", relations, relid_elem);
    // append_array prefixes "; " for mid-line use; trim it for a summary line
    out.trim_start_matches("; ").to_string()
}
