//! Instance field layouts and reference extraction
//!
//! An instance's raw field bytes hold the values of its class's declared
//! fields and of every super class, concatenated in a fixed order. The
//! effective layout is resolved once per class and cached; references are
//! then read at their byte offsets as big-endian identifiers.
//!
//! HotSpot and ART both write the instance's own class first and then walk
//! up the super-class chain (`FieldOrder::DescendantFirst`).

use super::HeapSnapshot;
use crate::config::FieldOrder;
use crate::error::AnalysisWarning;
use crate::model::{ClassRecord, Identifier, InstanceRecord};
use fnv::{FnvHashMap, FnvHashSet};
use std::rc::Rc;

/// Byte position and name of one reference-typed field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceSlot {
    pub offset: usize,
    pub name_id: Identifier,
}

/// Effective layout of a class including inherited fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLayout {
    /// Sum of all field widths; equals the instance data length when consistent
    pub total_size: usize,
    pub references: Vec<ReferenceSlot>,
}

/// Per-class layout cache over a finished snapshot
pub struct FieldLayouts<'s> {
    snapshot: &'s HeapSnapshot,
    order: FieldOrder,
    cache: FnvHashMap<Identifier, Option<Rc<ResolvedLayout>>>,
}

impl<'s> FieldLayouts<'s> {
    pub fn new(snapshot: &'s HeapSnapshot, order: FieldOrder) -> Self {
        Self {
            snapshot,
            order,
            cache: FnvHashMap::default(),
        }
    }

    /// Resolve the layout of `class_id`, `None` if the class was never dumped
    pub fn resolve(&mut self, class_id: Identifier) -> Option<Rc<ResolvedLayout>> {
        if let Some(cached) = self.cache.get(&class_id) {
            return cached.clone();
        }
        let layout = self.compute(class_id).map(Rc::new);
        self.cache.insert(class_id, layout.clone());
        layout
    }

    fn compute(&self, class_id: Identifier) -> Option<ResolvedLayout> {
        let mut chain: Vec<&ClassRecord> = Vec::new();
        let mut seen = FnvHashSet::default();
        let mut current = class_id;

        while !current.is_null() && seen.insert(current) {
            match self.snapshot.class(current) {
                Some(class) => {
                    chain.push(class);
                    current = class.super_class_id;
                }
                // An undumped ancestor ends the walk
                None => break,
            }
        }

        if chain.is_empty() {
            return None;
        }
        if self.order == FieldOrder::AncestorFirst {
            chain.reverse();
        }

        let id_size = self.snapshot.id_size();
        let mut offset = 0;
        let mut references = Vec::new();
        for class in chain {
            for field in &class.instance_fields {
                if field.field_type.is_reference() {
                    references.push(ReferenceSlot {
                        offset,
                        name_id: field.name_id,
                    });
                }
                offset += field.field_type.width(id_size);
            }
        }

        Some(ResolvedLayout {
            total_size: offset,
            references,
        })
    }

    /// Append the non-null references held by `instance` to `out`
    ///
    /// Returns a warning when the layout cannot be applied fully; fields that
    /// fit inside the stored bytes are still extracted.
    pub fn extract_references(
        &mut self,
        instance: &InstanceRecord,
        out: &mut Vec<Identifier>,
    ) -> Option<AnalysisWarning> {
        let Some(layout) = self.resolve(instance.class_id) else {
            return Some(AnalysisWarning::UnknownClass {
                object_id: instance.id,
                class_id: instance.class_id,
            });
        };

        let width = self.snapshot.id_size().bytes();
        for slot in &layout.references {
            match read_id_at(&instance.data, slot.offset, width) {
                Some(id) if !id.is_null() => out.push(id),
                Some(_) => {}
                None => break,
            }
        }

        (layout.total_size > instance.data.len()).then(|| AnalysisWarning::InconsistentFieldLayout {
            object_id: instance.id,
            class_id: instance.class_id,
            layout_size: layout.total_size,
            data_size: instance.data.len(),
        })
    }

    /// Name of the first field of `instance` that points at `target`
    pub fn referring_field(&mut self, instance: &InstanceRecord, target: Identifier) -> Option<Identifier> {
        let layout = self.resolve(instance.class_id)?;
        let width = self.snapshot.id_size().bytes();
        layout
            .references
            .iter()
            .find(|slot| read_id_at(&instance.data, slot.offset, width) == Some(target))
            .map(|slot| slot.name_id)
    }
}

fn read_id_at(data: &[u8], offset: usize, width: usize) -> Option<Identifier> {
    let bytes = data.get(offset..offset.checked_add(width)?)?;
    Some(Identifier(
        bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_id_at_bounds() {
        let data = [0, 0, 0, 7, 0, 0];
        assert_eq!(read_id_at(&data, 0, 4), Some(Identifier(7)));
        assert_eq!(read_id_at(&data, 2, 4), Some(Identifier(0x0007_0000)));
        assert_eq!(read_id_at(&data, 3, 4), None);
        assert_eq!(read_id_at(&data, usize::MAX, 4), None);
    }
}
