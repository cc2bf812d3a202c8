//! Programmatic HPROF writer
//!
//! Produces well-formed snapshots for tests, benchmarks and fuzz seeds.
//! Top-level `STRING` / `LOAD CLASS` records are written immediately; heap
//! sub-records accumulate in a pending segment that is flushed as a
//! `HEAP DUMP SEGMENT` record.

use super::tags;
use crate::model::{FieldType, IdSize, Identifier, RootKind};
use fnv::FnvHashMap;

pub const DEFAULT_VERSION: &str = "JAVA PROFILE 1.0.2";

/// Class dump description
#[derive(Debug, Clone)]
pub struct ClassDef {
    id: u64,
    name: String,
    super_class: u64,
    statics: Vec<(String, FieldType, u64)>,
    fields: Vec<(String, FieldType)>,
}

impl ClassDef {
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            super_class: 0,
            statics: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn super_class(mut self, id: u64) -> Self {
        self.super_class = id;
        self
    }

    /// Declare an instance field
    pub fn field(mut self, name: &str, field_type: FieldType) -> Self {
        self.fields.push((name.to_string(), field_type));
        self
    }

    /// Declare a static field; object values are raw identifiers
    pub fn static_field(mut self, name: &str, field_type: FieldType, value: u64) -> Self {
        self.statics.push((name.to_string(), field_type, value));
        self
    }
}

/// Big-endian encoder for instance field values, in declaration order
#[derive(Debug, Clone)]
pub struct FieldBytes {
    id_size: IdSize,
    buf: Vec<u8>,
}

impl FieldBytes {
    pub fn new(id_size: IdSize) -> Self {
        Self {
            id_size,
            buf: Vec::new(),
        }
    }

    pub fn id(mut self, id: u64) -> Self {
        put_id(&mut self.buf, self.id_size, id);
        self
    }

    pub fn boolean(mut self, v: bool) -> Self {
        self.buf.push(u8::from(v));
        self
    }

    pub fn byte(mut self, v: i8) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn char(mut self, v: u16) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn short(mut self, v: i16) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn int(mut self, v: i32) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn long(mut self, v: i64) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn float(mut self, v: f32) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn double(mut self, v: f64) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

fn put_id(buf: &mut Vec<u8>, id_size: IdSize, id: u64) {
    match id_size {
        IdSize::Four => buf.extend_from_slice(&(id as u32).to_be_bytes()),
        IdSize::Eight => buf.extend_from_slice(&id.to_be_bytes()),
    }
}

/// Snapshot writer
#[derive(Debug)]
pub struct HprofBuilder {
    id_size: IdSize,
    out: Vec<u8>,
    segment: Vec<u8>,
    interned: FnvHashMap<String, Identifier>,
    next_string_id: u64,
    next_class_serial: u32,
}

impl HprofBuilder {
    pub fn new(id_size: IdSize) -> Self {
        Self::with_version(id_size, DEFAULT_VERSION)
    }

    pub fn with_version(id_size: IdSize, version: &str) -> Self {
        let mut out = Vec::with_capacity(4096);
        out.extend_from_slice(version.as_bytes());
        out.push(0);
        out.extend_from_slice(&(id_size.bytes() as u32).to_be_bytes());
        out.extend_from_slice(&1_700_000_000_000u64.to_be_bytes());
        Self {
            id_size,
            out,
            segment: Vec::new(),
            interned: FnvHashMap::default(),
            next_string_id: 1,
            next_class_serial: 1,
        }
    }

    pub fn id_size(&self) -> IdSize {
        self.id_size
    }

    /// Encoder for instance field bytes matching this snapshot's id width
    pub fn fields(&self) -> FieldBytes {
        FieldBytes::new(self.id_size)
    }

    fn write_record(&mut self, tag: u8, payload: &[u8]) {
        self.out.push(tag);
        self.out.extend_from_slice(&0u32.to_be_bytes());
        self.out
            .extend_from_slice(&(payload.len() as u32).to_be_bytes());
        self.out.extend_from_slice(payload);
    }

    /// Emit a `STRING` record with an explicit identifier
    pub fn string(&mut self, id: u64, text: &str) -> &mut Self {
        let mut payload = Vec::with_capacity(self.id_size.bytes() + text.len());
        put_id(&mut payload, self.id_size, id);
        payload.extend_from_slice(text.as_bytes());
        self.write_record(tags::STRING, &payload);
        self
    }

    /// Identifier of `text` in the string table, emitting it on first use
    pub fn intern(&mut self, text: &str) -> Identifier {
        if let Some(&id) = self.interned.get(text) {
            return id;
        }
        let id = Identifier(self.next_string_id);
        self.next_string_id += 1;
        self.string(id.0, text);
        self.interned.insert(text.to_string(), id);
        id
    }

    /// Emit a `LOAD CLASS` record naming `class_id`
    pub fn load_class(&mut self, class_id: u64, name: &str) -> &mut Self {
        let name_id = self.intern(name);
        let serial = self.next_class_serial;
        self.next_class_serial += 1;

        let mut payload = Vec::new();
        payload.extend_from_slice(&serial.to_be_bytes());
        put_id(&mut payload, self.id_size, class_id);
        payload.extend_from_slice(&0u32.to_be_bytes());
        put_id(&mut payload, self.id_size, name_id.0);
        self.write_record(tags::LOAD_CLASS, &payload);
        self
    }

    /// Name the class and add its class dump to the pending segment
    pub fn class(&mut self, def: ClassDef) -> &mut Self {
        self.load_class(def.id, &def.name);
        self.class_dump(&def)
    }

    /// Add a class dump without a `LOAD CLASS` record
    pub fn class_dump(&mut self, def: &ClassDef) -> &mut Self {
        let id_size = self.id_size;
        let statics: Vec<(Identifier, FieldType, u64)> = def
            .statics
            .iter()
            .map(|(name, ty, value)| (self.intern(name), *ty, *value))
            .collect();
        let fields: Vec<(Identifier, FieldType)> = def
            .fields
            .iter()
            .map(|(name, ty)| (self.intern(name), *ty))
            .collect();
        let instance_size: usize = fields.iter().map(|(_, ty)| ty.width(id_size)).sum();

        let seg = &mut self.segment;
        seg.push(tags::CLASS_DUMP);
        put_id(seg, id_size, def.id);
        seg.extend_from_slice(&0u32.to_be_bytes());
        put_id(seg, id_size, def.super_class);
        for _ in 0..5 {
            put_id(seg, id_size, 0);
        }
        seg.extend_from_slice(&(instance_size as u32).to_be_bytes());
        seg.extend_from_slice(&0u16.to_be_bytes());

        seg.extend_from_slice(&(statics.len() as u16).to_be_bytes());
        for (name_id, ty, value) in statics {
            put_id(seg, id_size, name_id.0);
            seg.push(ty.tag());
            let width = ty.width(id_size);
            seg.extend_from_slice(&value.to_be_bytes()[8 - width..]);
        }

        seg.extend_from_slice(&(fields.len() as u16).to_be_bytes());
        for (name_id, ty) in fields {
            put_id(seg, id_size, name_id.0);
            seg.push(ty.tag());
        }
        self
    }

    /// Add a GC root sub-record with zeroed kind-specific fields
    pub fn root(&mut self, kind: RootKind, object_id: u64) -> &mut Self {
        let id_size = self.id_size;
        let seg = &mut self.segment;
        seg.push(kind.tag());
        put_id(seg, id_size, object_id);
        let extra = match kind {
            RootKind::JniGlobal => id_size.bytes(),
            RootKind::JniLocal
            | RootKind::JavaFrame
            | RootKind::JniMonitor
            | RootKind::ThreadObject => 8,
            RootKind::NativeStack | RootKind::ThreadBlock => 4,
            _ => 0,
        };
        seg.resize(seg.len() + extra, 0);
        self
    }

    pub fn instance(&mut self, id: u64, class_id: u64, data: &[u8]) -> &mut Self {
        let id_size = self.id_size;
        let seg = &mut self.segment;
        seg.push(tags::INSTANCE_DUMP);
        put_id(seg, id_size, id);
        seg.extend_from_slice(&0u32.to_be_bytes());
        put_id(seg, id_size, class_id);
        seg.extend_from_slice(&(data.len() as u32).to_be_bytes());
        seg.extend_from_slice(data);
        self
    }

    pub fn object_array(&mut self, id: u64, element_class_id: u64, elements: &[u64]) -> &mut Self {
        let id_size = self.id_size;
        let seg = &mut self.segment;
        seg.push(tags::OBJECT_ARRAY_DUMP);
        put_id(seg, id_size, id);
        seg.extend_from_slice(&0u32.to_be_bytes());
        seg.extend_from_slice(&(elements.len() as u32).to_be_bytes());
        put_id(seg, id_size, element_class_id);
        for &element in elements {
            put_id(seg, id_size, element);
        }
        self
    }

    /// Add a primitive array; `data` must be a whole number of elements
    pub fn primitive_array(&mut self, id: u64, element_type: FieldType, data: &[u8]) -> &mut Self {
        let length = data.len() / element_type.width(self.id_size);
        self.primitive_array_header(tags::PRIMITIVE_ARRAY_DUMP, id, element_type, length as u32);
        self.segment.extend_from_slice(data);
        self
    }

    /// Add a primitive array whose contents were omitted by the producer
    pub fn primitive_array_no_data(
        &mut self,
        id: u64,
        element_type: FieldType,
        length: u32,
    ) -> &mut Self {
        self.primitive_array_header(tags::PRIMITIVE_ARRAY_NODATA, id, element_type, length);
        self
    }

    fn primitive_array_header(&mut self, tag: u8, id: u64, element_type: FieldType, length: u32) {
        let id_size = self.id_size;
        let seg = &mut self.segment;
        seg.push(tag);
        put_id(seg, id_size, id);
        seg.extend_from_slice(&0u32.to_be_bytes());
        seg.extend_from_slice(&length.to_be_bytes());
        seg.push(element_type.tag());
    }

    /// Append arbitrary bytes to the pending segment
    pub fn raw_sub_record(&mut self, bytes: &[u8]) -> &mut Self {
        self.segment.extend_from_slice(bytes);
        self
    }

    /// Flush the pending segment, then emit an arbitrary top-level record
    pub fn record(&mut self, tag: u8, payload: &[u8]) -> &mut Self {
        self.flush_segment();
        self.write_record(tag, payload);
        self
    }

    /// Close the pending segment as a `HEAP DUMP SEGMENT` record
    pub fn flush_segment(&mut self) -> &mut Self {
        self.flush_segment_with_tag(tags::HEAP_DUMP_SEGMENT)
    }

    /// Close the pending segment under `tag` (`HEAP DUMP` or `HEAP DUMP SEGMENT`)
    pub fn flush_segment_with_tag(&mut self, tag: u8) -> &mut Self {
        if !self.segment.is_empty() {
            let segment = std::mem::take(&mut self.segment);
            self.write_record(tag, &segment);
        }
        self
    }

    /// Flush and return the encoded snapshot
    pub fn finish(mut self) -> Vec<u8> {
        if !self.segment.is_empty() {
            self.flush_segment();
            self.write_record(tags::HEAP_DUMP_END, &[]);
        }
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let bytes = HprofBuilder::new(IdSize::Eight).finish();
        let nul = bytes.iter().position(|&b| b == 0).unwrap();
        assert_eq!(&bytes[..nul], DEFAULT_VERSION.as_bytes());
        assert_eq!(&bytes[nul + 1..nul + 5], &[0, 0, 0, 8]);
        assert_eq!(bytes.len(), nul + 1 + 4 + 8);
    }

    #[test]
    fn test_intern_deduplicates() {
        let mut builder = HprofBuilder::new(IdSize::Four);
        let a = builder.intern("value");
        let b = builder.intern("value");
        let c = builder.intern("next");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_field_bytes_widths() {
        let bytes = FieldBytes::new(IdSize::Four)
            .id(0x10)
            .int(-1)
            .boolean(true)
            .long(2)
            .into_bytes();
        assert_eq!(bytes.len(), 4 + 4 + 1 + 8);
        assert_eq!(&bytes[..4], &[0, 0, 0, 0x10]);
        assert_eq!(&bytes[4..8], &[0xff; 4]);
    }
}
