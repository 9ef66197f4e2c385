//! Ordered sub-collection reconciliation.
//!
//! DNS servers and DNS64 exclusions are ordered lists whose elements carry
//! their own ids. On every run the declared list is merged with the list the
//! controller currently holds:
//!
//! - the element at each position keeps that position's id, even when its
//!   value was edited in place;
//! - when a prior value moved to another position, its old position gets a
//!   fresh id, so a reorder never swaps ids between elements;
//! - trailing elements dropped from the declaration disappear;
//! - `order` is always the list position (`0..n`).

use serde::{Deserialize, Serialize};

use super::identity::{IdGenerator, PriorId, reconcile_identities};

/// Element of an ordered sub-collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderedItem {
    /// Sub-entity identifier.
    pub id: String,
    /// Element value (server address, excluded name).
    pub value: String,
    /// Zero-based position.
    pub order: usize,
}

impl OrderedItem {
    /// Creates an item.
    #[must_use]
    pub fn new(id: impl Into<String>, value: impl Into<String>, order: usize) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            order,
        }
    }
}

/// Derives the reusable id of every position from the prior list.
///
/// The prior list is taken in `order` sequence. A position is flagged
/// [`PriorId::Unknown`] when its prior value is now declared at a different
/// index. Edits in place keep the prior id.
#[must_use]
pub fn prior_slots(declared: &[String], prior: &[OrderedItem]) -> Vec<PriorId> {
    let mut sorted: Vec<&OrderedItem> = prior.iter().collect();
    sorted.sort_by_key(|item| item.order);

    sorted
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let unchanged = declared.get(i).is_some_and(|value| *value == item.value);
            let moved = !unchanged && declared.iter().any(|value| *value == item.value);
            if moved {
                PriorId::Unknown
            } else {
                PriorId::Known(item.id.clone())
            }
        })
        .collect()
}

/// Merges a declared ordered list with the prior one.
///
/// Returns one item per declared value with `order == index`, sorted by
/// `order`. Running it again on its own output with the same declaration
/// returns the same list.
pub fn reconcile(
    declared: &[String],
    prior: &[OrderedItem],
    ids: &mut dyn IdGenerator,
) -> Vec<OrderedItem> {
    let slots = prior_slots(declared, prior);

    reconcile_identities(declared, &slots, ids)
        .into_iter()
        .enumerate()
        .map(|(order, (id, value))| OrderedItem { id, value, order })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::identity::SequentialIds;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn test_fresh_list_gets_dense_orders() {
        let mut ids = SequentialIds::new("id");
        let out = reconcile(&strings(&["1.1.1.1", "4.4.4.4"]), &[], &mut ids);
        assert_eq!(
            out,
            vec![
                OrderedItem::new("id-1", "1.1.1.1", 0),
                OrderedItem::new("id-2", "4.4.4.4", 1),
            ]
        );
    }

    #[test]
    fn test_truncation_keeps_first_id() {
        let mut ids = SequentialIds::new("id");
        let first = reconcile(&strings(&["1.1.1.1", "4.4.4.4"]), &[], &mut ids);
        let second = reconcile(&strings(&["1.1.1.1"]), &first, &mut ids);

        assert_eq!(second, vec![OrderedItem::new("id-1", "1.1.1.1", 0)]);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut ids = SequentialIds::new("id");
        let declared = strings(&["a", "b", "c"]);
        let first = reconcile(&declared, &[], &mut ids);
        let second = reconcile(&declared, &first, &mut ids);
        assert_eq!(first, second);
    }

    #[test]
    fn test_reorder_mints_fresh_ids() {
        let mut ids = SequentialIds::new("id");
        let first = reconcile(&strings(&["a", "b"]), &[], &mut ids);
        let swapped = reconcile(&strings(&["b", "a"]), &first, &mut ids);

        let old_ids: Vec<&str> = first.iter().map(|i| i.id.as_str()).collect();
        for item in &swapped {
            assert!(!old_ids.contains(&item.id.as_str()));
        }
        assert_eq!(swapped[0].value, "b");
        assert_eq!(swapped[0].order, 0);
        assert_eq!(swapped[1].order, 1);
    }

    #[test]
    fn test_edit_in_place_keeps_ids() {
        let mut ids = SequentialIds::new("id");
        let first = reconcile(&strings(&["1.1.1.1", "4.4.4.4"]), &[], &mut ids);
        let edited = reconcile(&strings(&["1.1.1.1", "8.8.8.8"]), &first, &mut ids);

        assert_eq!(
            edited,
            vec![
                OrderedItem::new("id-1", "1.1.1.1", 0),
                OrderedItem::new("id-2", "8.8.8.8", 1),
            ]
        );
    }

    #[test]
    fn test_moved_value_releases_old_position() {
        let mut ids = SequentialIds::new("id");
        let first = reconcile(&strings(&["a", "b", "c"]), &[], &mut ids);
        let second = reconcile(&strings(&["x", "a", "c"]), &first, &mut ids);

        assert_eq!(second[0], OrderedItem::new("id-4", "x", 0));
        assert_eq!(second[1], OrderedItem::new("id-2", "a", 1));
        assert_eq!(second[2], OrderedItem::new("id-3", "c", 2));
    }

    #[test]
    fn test_prior_read_in_order_sequence() {
        let prior = vec![
            OrderedItem::new("id-b", "b", 1),
            OrderedItem::new("id-a", "a", 0),
        ];
        let slots = prior_slots(&strings(&["a", "b"]), &prior);
        assert_eq!(
            slots,
            vec![
                PriorId::Known(String::from("id-a")),
                PriorId::Known(String::from("id-b")),
            ]
        );
    }

    #[test]
    fn test_append_keeps_existing_ids() {
        let mut ids = SequentialIds::new("id");
        let first = reconcile(&strings(&["a"]), &[], &mut ids);
        let second = reconcile(&strings(&["a", "b"]), &first, &mut ids);
        assert_eq!(second[0].id, first[0].id);
        assert_eq!(second[1], OrderedItem::new("id-2", "b", 1));
    }

    #[test]
    fn test_empty_declaration_clears_list() {
        let mut ids = SequentialIds::new("id");
        let first = reconcile(&strings(&["a"]), &[], &mut ids);
        assert!(reconcile(&[], &first, &mut ids).is_empty());
    }
}
