//! Duplicate string contents
//!
//! String instances are decoded through the `char[]` or `byte[]` array they
//! reference. Instances with identical text are grouped; every copy beyond
//! the first is wasted memory.

use super::{HeapView, PatternBook};
use crate::config::{LeakConfig, TextEncoding};
use crate::model::{FieldType, HeapObject, Identifier, ObjectIndex, PrimitiveArrayRecord};
use fnv::{FnvHashMap, FnvHashSet};
use serde::Serialize;

/// Sample identifiers kept per group
const SAMPLE_IDS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateString {
    /// Text, truncated to the configured preview length
    pub preview: String,
    pub count: usize,
    /// String objects plus their distinct backing arrays
    pub total_bytes: u64,
    /// `total_bytes` minus one string object and its backing array
    pub wasted_bytes: u64,
    /// Lowest string identifiers of the group
    pub sample_ids: Vec<Identifier>,
}

struct Group {
    /// String identifier, instance size, backing array
    copies: Vec<(Identifier, u64, ObjectIndex)>,
    total: u64,
}

pub fn scan(
    view: &HeapView<'_>,
    config: &LeakConfig,
    patterns: &PatternBook,
) -> Vec<DuplicateString> {
    let snapshot = view.snapshot;
    let mut is_string: FnvHashMap<Identifier, bool> = FnvHashMap::default();
    let mut groups: FnvHashMap<String, Group> = FnvHashMap::default();
    let mut arrays_seen: FnvHashSet<ObjectIndex> = FnvHashSet::default();

    for (idx, object) in snapshot.objects().iter().enumerate() {
        let HeapObject::Instance(instance) = object else {
            continue;
        };
        let matches = *is_string
            .entry(instance.class_id)
            .or_insert_with(|| patterns.string.matches(snapshot.class_name(instance.class_id)));
        if !matches {
            continue;
        }

        let node = idx as ObjectIndex;
        let Some((array_idx, text)) = view
            .graph
            .outgoing(node)
            .iter()
            .find_map(|&target| {
                let array = snapshot.object(target).as_primitive_array()?;
                decode(array, &config.byte_encodings).map(|text| (target, text))
            })
        else {
            continue;
        };

        let mut bytes = instance.shallow_size;
        if arrays_seen.insert(array_idx) {
            bytes += view.shallow(array_idx);
        }
        let group = groups.entry(text).or_insert_with(|| Group {
            copies: Vec::new(),
            total: 0,
        });
        group.copies.push((instance.id, instance.shallow_size, array_idx));
        group.total = group.total.saturating_add(bytes);
    }

    let mut duplicates: Vec<DuplicateString> = groups
        .into_iter()
        .filter(|(_, group)| group.copies.len() >= config.min_duplicate_strings)
        .map(|(text, mut group)| {
            group.copies.sort_unstable();
            // The array may have been charged to a later copy
            let (_, instance_size, array_idx) = group.copies[0];
            let kept = instance_size.saturating_add(view.shallow(array_idx));
            DuplicateString {
                preview: preview(&text, config.max_string_preview),
                count: group.copies.len(),
                total_bytes: group.total,
                wasted_bytes: group.total.saturating_sub(kept),
                sample_ids: group
                    .copies
                    .iter()
                    .take(SAMPLE_IDS)
                    .map(|&(id, _, _)| id)
                    .collect(),
            }
        })
        .collect();

    duplicates.sort_by(|a, b| {
        b.wasted_bytes
            .cmp(&a.wasted_bytes)
            .then_with(|| a.preview.cmp(&b.preview))
            .then_with(|| a.sample_ids.cmp(&b.sample_ids))
    });
    duplicates
}

/// Decode a string backing array; `None` if it is not text
pub fn decode(array: &PrimitiveArrayRecord, byte_encodings: &[TextEncoding]) -> Option<String> {
    if array.data.is_empty() && array.length > 0 {
        // Contents were not dumped
        return None;
    }
    match array.element_type {
        FieldType::Char => Some(decode_utf16_lossy(&array.data)),
        FieldType::Byte => byte_encodings
            .iter()
            .find_map(|&encoding| decode_bytes(&array.data, encoding)),
        _ => None,
    }
}

fn decode_bytes(data: &[u8], encoding: TextEncoding) -> Option<String> {
    match encoding {
        TextEncoding::Utf8 => std::str::from_utf8(data).ok().map(str::to_string),
        TextEncoding::Latin1 => Some(data.iter().map(|&b| char::from(b)).collect()),
        TextEncoding::Utf16Be => {
            if data.len() % 2 != 0 {
                return None;
            }
            char::decode_utf16(utf16_units(data))
                .collect::<Result<String, _>>()
                .ok()
        }
    }
}

fn decode_utf16_lossy(data: &[u8]) -> String {
    char::decode_utf16(utf16_units(data))
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

fn utf16_units(data: &[u8]) -> impl Iterator<Item = u16> + '_ {
    data.chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(element_type: FieldType, data: &[u8]) -> PrimitiveArrayRecord {
        PrimitiveArrayRecord {
            id: Identifier(1),
            element_type,
            length: (data.len() / element_type.width(crate::model::IdSize::Four)) as u32,
            data: data.to_vec(),
            shallow_size: 0,
        }
    }

    #[test]
    fn test_decode_char_array() {
        let data: Vec<u8> = "héllo".encode_utf16().flat_map(u16::to_be_bytes).collect();
        assert_eq!(
            decode(&array(FieldType::Char, &data), &[]).as_deref(),
            Some("héllo")
        );
    }

    #[test]
    fn test_decode_byte_array_fallback() {
        let encodings = [TextEncoding::Utf8, TextEncoding::Latin1];
        assert_eq!(
            decode(&array(FieldType::Byte, b"plain"), &encodings).as_deref(),
            Some("plain")
        );
        // 0xE9 alone is invalid UTF-8 but valid Latin-1
        assert_eq!(
            decode(&array(FieldType::Byte, &[b'c', 0xe9]), &encodings).as_deref(),
            Some("cé")
        );
        assert_eq!(decode(&array(FieldType::Byte, &[0xe9]), &[TextEncoding::Utf8]), None);
    }

    #[test]
    fn test_decode_skips_missing_data_and_other_types() {
        let mut no_data = array(FieldType::Byte, &[]);
        no_data.length = 4;
        assert_eq!(decode(&no_data, &[TextEncoding::Latin1]), None);
        assert_eq!(decode(&array(FieldType::Int, &[0; 4]), &[TextEncoding::Latin1]), None);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("ééééé", 3), "ééé...");
        assert_eq!(preview("short", 10), "short");
    }
}
