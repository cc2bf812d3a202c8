//! HPROF snapshot decoding
//!
//! [`HeapSnapshot::parse`] drives the [`RecordStream`] over the input,
//! collects the string table and class names, and feeds every heap-dump
//! segment to the [`HeapGraphBuilder`]. The result is an immutable arena of
//! decoded objects plus the GC roots.
//!
//! # Example
//!
//! ```
//! use heaplens::hprof::builder::{ClassDef, HprofBuilder};
//! use heaplens::hprof::{HeapSnapshot, ParseOptions};
//! use heaplens::model::{IdSize, RootKind};
//!
//! # fn main() -> heaplens::error::Result<()> {
//! let mut builder = HprofBuilder::new(IdSize::Four);
//! builder.class(ClassDef::new(0x100, "com.example.Holder"));
//! builder.instance(0x200, 0x100, &[]);
//! builder.root(RootKind::JavaFrame, 0x200);
//! let bytes = builder.finish();
//!
//! let mut warnings = Vec::new();
//! let snapshot = HeapSnapshot::parse(&bytes, &ParseOptions::default(), &mut warnings)?;
//! assert_eq!(snapshot.len(), 2);
//! assert_eq!(snapshot.roots().len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod heap_dump;
pub mod layout;
pub mod records;
pub mod tags;

pub use heap_dump::HeapGraphBuilder;
pub use layout::{FieldLayouts, ResolvedLayout};
pub use records::{RecordStream, SnapshotHeader};

use crate::analysis::CancellationToken;
use crate::config::AnalysisConfig;
use crate::error::{AnalysisWarning, HeapError, Result};
use crate::model::{
    normalize_class_name, ClassRecord, GcRoot, HeapObject, IdSize, Identifier, ObjectIndex,
};
use fnv::FnvHashMap;
use std::borrow::Cow;

/// Identifier → decoded text of every `STRING` record
pub type StringTable = FnvHashMap<Identifier, String>;

/// Name reported for classes that were never named by a `LOAD CLASS` record
pub const UNKNOWN_CLASS: &str = "unknown";

/// Decoder settings
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub id_size_override: Option<IdSize>,
    /// Abort on malformed sub-records instead of abandoning the segment
    pub strict: bool,
    pub max_objects: usize,
    pub cancel: Option<CancellationToken>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

impl ParseOptions {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            id_size_override: config.id_size_override.and_then(IdSize::from_width),
            strict: config.strict,
            max_objects: config.limits.max_objects,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Fully decoded heap snapshot
#[derive(Debug)]
pub struct HeapSnapshot {
    header: SnapshotHeader,
    strings: StringTable,
    class_names: FnvHashMap<Identifier, String>,
    objects: Vec<HeapObject>,
    index: FnvHashMap<Identifier, ObjectIndex>,
    roots: Vec<GcRoot>,
}

impl HeapSnapshot {
    /// Decode a complete snapshot
    ///
    /// Fatal decode errors carry the tag and offset of the top-level record
    /// they occurred in. Recoverable problems are appended to `warnings`.
    pub fn parse(
        data: &[u8],
        options: &ParseOptions,
        warnings: &mut Vec<AnalysisWarning>,
    ) -> Result<Self> {
        let mut stream = RecordStream::open(data, options.id_size_override)?;
        let header = stream.header().clone();
        let mut builder =
            HeapGraphBuilder::new(header.id_size, options.max_objects, options.cancel.clone());
        let mut strings = StringTable::default();
        let mut loaded: FnvHashMap<Identifier, Identifier> = FnvHashMap::default();
        let mut segments = 0usize;

        tracing::info!(
            "Parsing HPROF snapshot: {} bytes, version {:?}, {}-byte identifiers",
            data.len(),
            header.version,
            header.id_size.bytes()
        );

        while let Some(mut record) = stream.next_record()? {
            if let Some(token) = &options.cancel {
                token.check()?;
            }

            let (tag, offset) = (record.tag, record.offset);
            let outcome = match tag {
                tags::STRING => record.read_string().map(|(id, text)| {
                    strings.insert(id, text);
                }),
                tags::LOAD_CLASS => record.read_load_class().map(|load| {
                    loaded.insert(load.class_id, load.name_id);
                }),
                _ if record.is_heap_dump() => {
                    segments += 1;
                    let result = builder.read_segment(&mut record.body);
                    tracing::debug!(
                        "Heap-dump segment at offset {}: {} objects, {} roots so far",
                        offset,
                        builder.object_count(),
                        builder.root_count()
                    );
                    match result {
                        Err(e) if e.is_segment_local() && !options.strict => {
                            let skipped = record.body.skip_to_end();
                            tracing::warn!(
                                "Abandoning heap-dump segment at offset {}: {}",
                                offset,
                                e
                            );
                            warnings.push(AnalysisWarning::SegmentAbandoned {
                                segment_offset: offset,
                                skipped_bytes: skipped,
                                error: e.to_string(),
                            });
                            Ok(())
                        }
                        other => other,
                    }
                }
                _ if record.is_skippable() => Ok(()),
                _ => Err(HeapError::UnsupportedRecordTag { tag, offset }),
            };
            outcome.map_err(|e| e.in_record(tag, offset))?;
        }

        let (mut objects, index, roots) = builder.finish();

        let mut class_names: FnvHashMap<Identifier, String> = loaded
            .iter()
            .map(|(&class_id, name_id)| {
                let name = strings
                    .get(name_id)
                    .map(|raw| normalize_class_name(raw))
                    .unwrap_or_else(|| format!("{}@{}", UNKNOWN_CLASS, class_id));
                (class_id, name)
            })
            .collect();

        for object in &mut objects {
            if let HeapObject::Class(class) = object {
                let name = class_names
                    .entry(class.id)
                    .or_insert_with(|| format!("{}@{}", UNKNOWN_CLASS, class.id));
                class.name = name.clone();
            }
        }

        tracing::info!(
            "Parsed {} segments: {} objects, {} GC roots, {} strings, {} classes",
            segments,
            objects.len(),
            roots.len(),
            strings.len(),
            class_names.len()
        );

        Ok(Self {
            header,
            strings,
            class_names,
            objects,
            index,
            roots,
        })
    }

    pub fn header(&self) -> &SnapshotHeader {
        &self.header
    }

    pub fn id_size(&self) -> IdSize {
        self.header.id_size
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    pub fn string(&self, id: Identifier) -> Option<&str> {
        self.strings.get(&id).map(String::as_str)
    }

    pub fn objects(&self) -> &[HeapObject] {
        &self.objects
    }

    pub fn object(&self, index: ObjectIndex) -> &HeapObject {
        &self.objects[index as usize]
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Arena index of an identifier; never resolves `Identifier::NULL`
    pub fn index_of(&self, id: Identifier) -> Option<ObjectIndex> {
        if id.is_null() {
            return None;
        }
        self.index.get(&id).copied()
    }

    pub fn get(&self, id: Identifier) -> Option<&HeapObject> {
        self.index_of(id).map(|idx| self.object(idx))
    }

    pub fn class(&self, id: Identifier) -> Option<&ClassRecord> {
        self.get(id).and_then(HeapObject::as_class)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassRecord> {
        self.objects.iter().filter_map(HeapObject::as_class)
    }

    pub fn roots(&self) -> &[GcRoot] {
        &self.roots
    }

    /// Name of a class from `LOAD CLASS` records, whether or not it was dumped
    pub fn class_name(&self, class_id: Identifier) -> &str {
        self.class_names
            .get(&class_id)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_CLASS)
    }

    /// Class-like display name of any object: `Foo`, `Foo[]`, `byte[]`
    pub fn type_name(&self, index: ObjectIndex) -> Cow<'_, str> {
        match self.object(index) {
            HeapObject::Class(class) => Cow::Borrowed(class.name.as_str()),
            HeapObject::Instance(instance) => Cow::Borrowed(self.class_name(instance.class_id)),
            HeapObject::ObjectArray(array) => {
                let element = self.class_name(array.element_class_id);
                // ART names the array class itself (`Foo[]`), HotSpot the element
                if element.ends_with("[]") {
                    Cow::Borrowed(element)
                } else {
                    Cow::Owned(format!("{}[]", element))
                }
            }
            HeapObject::PrimitiveArray(array) => Cow::Owned(array.element_type.array_name()),
        }
    }
}
