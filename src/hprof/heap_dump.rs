//! Heap-dump segment decoding
//!
//! A segment is a sequence of sub-records, each introduced by a one-byte
//! tag. GC roots, class dumps, instances and arrays are decoded into the
//! object arena; instance field bytes are stored verbatim because their
//! layout is only known once every class in the snapshot has been read.

use super::tags;
use crate::analysis::CancellationToken;
use crate::cursor::ByteCursor;
use crate::error::{HeapError, Result};
use crate::model::{
    ClassRecord, FieldDef, FieldType, GcRoot, HeapObject, IdSize, Identifier, InstanceRecord,
    ObjectArrayRecord, ObjectIndex, PrimitiveArrayRecord, RootDetail, RootKind, StaticField,
};
use fnv::FnvHashMap;

/// Sub-records between cooperative cancellation checks
const CANCEL_CHECK_INTERVAL: u64 = 4096;

/// Accumulates decoded objects and roots across all heap-dump segments
pub struct HeapGraphBuilder {
    id_size: IdSize,
    objects: Vec<HeapObject>,
    index: FnvHashMap<Identifier, ObjectIndex>,
    roots: Vec<GcRoot>,
    max_objects: usize,
    cancel: Option<CancellationToken>,
    sub_records: u64,
    duplicate_ids: u64,
}

impl HeapGraphBuilder {
    pub fn new(id_size: IdSize, max_objects: usize, cancel: Option<CancellationToken>) -> Self {
        Self {
            id_size,
            objects: Vec::new(),
            index: FnvHashMap::default(),
            roots: Vec::new(),
            max_objects,
            cancel,
            sub_records: 0,
            duplicate_ids: 0,
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    /// Decode every sub-record of one segment
    ///
    /// Stops at the first malformed sub-record; the caller decides whether
    /// that abandons the segment or the whole parse.
    pub fn read_segment(&mut self, body: &mut ByteCursor<'_>) -> Result<()> {
        while !body.is_empty() {
            self.sub_records += 1;
            if self.sub_records % CANCEL_CHECK_INTERVAL == 0 {
                if let Some(token) = &self.cancel {
                    token.check()?;
                }
            }

            let offset = body.offset();
            let tag = body.read_u8()?;
            self.read_sub_record(tag, offset, body)?;
        }
        Ok(())
    }

    fn read_sub_record(&mut self, tag: u8, offset: u64, body: &mut ByteCursor<'_>) -> Result<()> {
        if let Some(kind) = RootKind::from_tag(tag) {
            return self.read_root(kind, body);
        }

        match tag {
            tags::CLASS_DUMP => self.read_class_dump(offset, body),
            tags::INSTANCE_DUMP => self.read_instance_dump(body),
            tags::OBJECT_ARRAY_DUMP => self.read_object_array(body),
            tags::PRIMITIVE_ARRAY_DUMP => self.read_primitive_array(offset, body, true),
            tags::PRIMITIVE_ARRAY_NODATA => self.read_primitive_array(offset, body, false),
            tags::HEAP_DUMP_INFO => body.skip(4 + self.id_size.bytes()),
            other => Err(HeapError::MalformedSubRecord {
                tag: other,
                offset,
                reason: "unrecognized sub-record tag".to_string(),
            }),
        }
    }

    fn read_root(&mut self, kind: RootKind, body: &mut ByteCursor<'_>) -> Result<()> {
        let object_id = body.read_id()?;
        let detail = match kind {
            RootKind::JniGlobal => RootDetail::JniGlobal {
                jni_ref: body.read_id()?,
            },
            RootKind::JniLocal | RootKind::JavaFrame | RootKind::JniMonitor => RootDetail::Frame {
                thread_serial: body.read_u32()?,
                frame_number: body.read_u32()?,
            },
            RootKind::NativeStack | RootKind::ThreadBlock => RootDetail::Thread {
                thread_serial: body.read_u32()?,
            },
            RootKind::ThreadObject => RootDetail::ThreadObject {
                thread_serial: body.read_u32()?,
                stack_trace_serial: body.read_u32()?,
            },
            _ => RootDetail::None,
        };

        if !object_id.is_null() {
            self.roots.push(GcRoot {
                object_id,
                kind,
                detail,
            });
        }
        Ok(())
    }

    fn read_field_type(&self, tag: u8, offset: u64, body: &mut ByteCursor<'_>) -> Result<FieldType> {
        let type_tag = body.read_u8()?;
        FieldType::from_tag(type_tag).ok_or_else(|| HeapError::MalformedSubRecord {
            tag,
            offset,
            reason: format!("unknown basic type {}", type_tag),
        })
    }

    fn read_class_dump(&mut self, offset: u64, body: &mut ByteCursor<'_>) -> Result<()> {
        let id_size = self.id_size;
        let id = body.read_id()?;
        let _stack_trace_serial = body.read_u32()?;
        let super_class_id = body.read_id()?;
        // class loader, signers, protection domain, two reserved
        body.skip(5 * id_size.bytes())?;
        let instance_size = body.read_u32()?;

        let constant_count = body.read_u16()?;
        for _ in 0..constant_count {
            let _pool_index = body.read_u16()?;
            let ty = self.read_field_type(tags::CLASS_DUMP, offset, body)?;
            body.skip(ty.width(id_size))?;
        }

        let static_count = body.read_u16()?;
        let mut static_fields = Vec::with_capacity(static_count as usize);
        for _ in 0..static_count {
            let name_id = body.read_id()?;
            let field_type = self.read_field_type(tags::CLASS_DUMP, offset, body)?;
            let value = body.read_uint(field_type.width(id_size))?;
            static_fields.push(StaticField {
                name_id,
                field_type,
                value,
            });
        }

        let field_count = body.read_u16()?;
        let mut instance_fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let name_id = body.read_id()?;
            let field_type = self.read_field_type(tags::CLASS_DUMP, offset, body)?;
            instance_fields.push(FieldDef {
                name_id,
                field_type,
            });
        }

        let shallow_size = static_fields
            .iter()
            .map(|f| f.field_type.width(id_size) as u64)
            .sum();

        self.insert(HeapObject::Class(ClassRecord {
            id,
            // Resolved from LOAD CLASS records once the stream is complete
            name: String::new(),
            super_class_id,
            instance_size,
            static_fields,
            instance_fields,
            shallow_size,
        }))
    }

    fn read_instance_dump(&mut self, body: &mut ByteCursor<'_>) -> Result<()> {
        let id = body.read_id()?;
        let _stack_trace_serial = body.read_u32()?;
        let class_id = body.read_id()?;
        let length = body.read_u32()? as usize;
        let data = body.read_bytes(length)?.to_vec();

        self.insert(HeapObject::Instance(InstanceRecord {
            id,
            class_id,
            shallow_size: self.id_size.object_header_size() + length as u64,
            data,
        }))
    }

    fn read_object_array(&mut self, body: &mut ByteCursor<'_>) -> Result<()> {
        let id = body.read_id()?;
        let _stack_trace_serial = body.read_u32()?;
        let length = body.read_u32()? as usize;
        let element_class_id = body.read_id()?;

        let id_width = self.id_size.bytes();
        let raw = body.read_bytes(length * id_width)?;
        let elements = raw
            .chunks_exact(id_width)
            .map(|chunk| Identifier(chunk.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))))
            .collect();

        self.insert(HeapObject::ObjectArray(ObjectArrayRecord {
            id,
            element_class_id,
            elements,
            shallow_size: self.id_size.array_header_size() + (length * id_width) as u64,
        }))
    }

    fn read_primitive_array(
        &mut self,
        offset: u64,
        body: &mut ByteCursor<'_>,
        with_data: bool,
    ) -> Result<()> {
        let tag = if with_data {
            tags::PRIMITIVE_ARRAY_DUMP
        } else {
            tags::PRIMITIVE_ARRAY_NODATA
        };
        let id = body.read_id()?;
        let _stack_trace_serial = body.read_u32()?;
        let length = body.read_u32()?;
        let element_type = self.read_field_type(tag, offset, body)?;
        if element_type.is_reference() {
            return Err(HeapError::MalformedSubRecord {
                tag,
                offset,
                reason: "primitive array declares object elements".to_string(),
            });
        }

        let byte_len = length as usize * element_type.width(self.id_size);
        let data = if with_data {
            body.read_bytes(byte_len)?.to_vec()
        } else {
            Vec::new()
        };

        self.insert(HeapObject::PrimitiveArray(PrimitiveArrayRecord {
            id,
            element_type,
            length,
            data,
            shallow_size: self.id_size.array_header_size() + byte_len as u64,
        }))
    }

    fn insert(&mut self, object: HeapObject) -> Result<()> {
        let id = object.id();
        if id.is_null() || self.index.contains_key(&id) {
            self.duplicate_ids += 1;
            return Ok(());
        }

        if self.objects.len() >= self.max_objects {
            return Err(HeapError::ResourceLimitExceeded {
                stage: "heap graph builder",
                limit: self.max_objects,
                actual: self.objects.len() + 1,
            });
        }

        self.index.insert(id, self.objects.len() as ObjectIndex);
        self.objects.push(object);
        Ok(())
    }

    /// Hand over the arena, its identifier index and the GC roots
    pub fn finish(self) -> (Vec<HeapObject>, FnvHashMap<Identifier, ObjectIndex>, Vec<GcRoot>) {
        if self.duplicate_ids > 0 {
            tracing::debug!(
                "Ignored {} sub-records with null or repeated identifiers",
                self.duplicate_ids
            );
        }
        (self.objects, self.index, self.roots)
    }
}
