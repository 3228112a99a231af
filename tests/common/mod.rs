//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use ohco::{ObjectType, Record, RecordRef};

pub fn of_type(records: &[Record], ty: ObjectType) -> Vec<&Record> {
    let mut found: Vec<_> = records.iter().filter(|r| r.object_type == ty).collect();
    found.sort_by_key(|r| r.id);
    found
}

fn by_ref(records: &[Record]) -> BTreeMap<RecordRef, &Record> {
    records.iter().map(|r| (r.reference(), r)).collect()
}

/// Containment and sibling order of nesting records, plus ordinals and id
/// sequencing of every record.
pub fn assert_well_nested(records: &[Record]) {
    let index = by_ref(records);
    let mut children: BTreeMap<Option<RecordRef>, Vec<&Record>> = BTreeMap::new();

    for record in records.iter().filter(|r| r.object_type.is_nesting()) {
        assert!(record.start <= record.end, "{record:?} has an inverted range");
        if let Some(parent) = record.parent {
            let parent = index[&parent];
            assert!(
                parent.start <= record.start && record.end <= parent.end,
                "{record:?} escapes its parent {parent:?}"
            );
        }
        children.entry(record.parent).or_default().push(record);
    }

    for siblings in children.values_mut() {
        siblings.sort_by_key(|r| (r.start, r.end));
        for pair in siblings.windows(2) {
            assert!(
                pair[0].end <= pair[1].start,
                "siblings overlap: {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    let mut same_type: BTreeMap<(Option<RecordRef>, ObjectType), Vec<&Record>> = BTreeMap::new();
    for record in records {
        same_type
            .entry((record.parent, record.object_type))
            .or_default()
            .push(record);
    }
    for group in same_type.values_mut() {
        group.sort_by_key(|r| r.id);
        let ordinals: Vec<_> = group.iter().map(|r| r.ordinal).collect();
        let expected: Vec<_> = (1..=group.len() as u32).collect();
        assert_eq!(ordinals, expected, "sibling ordinals of {:?}", group[0].parent);
    }

    for ty in ObjectType::ALL {
        let found = of_type(records, ty);
        let ids: Vec<_> = found.iter().map(|r| r.id).collect();
        let expected: Vec<_> = (1..=found.len() as u32).collect();
        assert_eq!(ids, expected, "{ty} ids are not 1..=n");
        assert!(
            found.windows(2).all(|w| w[0].start <= w[1].start),
            "{ty} ids are not in document order"
        );
    }
}
