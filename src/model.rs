//! Heap snapshot data model
//!
//! Every decoded object lives in a dense arena as a tagged [`HeapObject`]
//! and is addressed by an [`ObjectIndex`]; the HPROF [`Identifier`] is only
//! used once, at decode time, to look that index up.

use serde::Serialize;
use std::fmt;

/// Dense arena index of a decoded object
pub type ObjectIndex = u32;

/// Object or class handle as written in the snapshot
///
/// `Identifier::NULL` is the null-reference sentinel and never becomes a
/// graph node or edge endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Identifier(pub u64);

impl Identifier {
    pub const NULL: Identifier = Identifier(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Width of identifiers in a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IdSize {
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "8")]
    Eight,
}

impl IdSize {
    /// Map a header-declared width to an identifier size
    pub fn from_width(width: u32) -> Option<Self> {
        match width {
            4 => Some(IdSize::Four),
            8 => Some(IdSize::Eight),
            _ => None,
        }
    }

    /// Identifier width in bytes
    pub fn bytes(self) -> usize {
        match self {
            IdSize::Four => 4,
            IdSize::Eight => 8,
        }
    }

    /// Fixed object header charged to every instance's shallow size
    pub fn object_header_size(self) -> u64 {
        match self {
            IdSize::Four => 8,
            IdSize::Eight => 16,
        }
    }

    /// Fixed header (object header plus length word) charged to arrays
    pub fn array_header_size(self) -> u64 {
        match self {
            IdSize::Four => 12,
            IdSize::Eight => 16,
        }
    }
}

/// HPROF basic type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Object,
    Boolean,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
}

impl FieldType {
    /// Decode a basic type tag, `None` for tags outside the format
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            2 => Some(FieldType::Object),
            4 => Some(FieldType::Boolean),
            5 => Some(FieldType::Char),
            6 => Some(FieldType::Float),
            7 => Some(FieldType::Double),
            8 => Some(FieldType::Byte),
            9 => Some(FieldType::Short),
            10 => Some(FieldType::Int),
            11 => Some(FieldType::Long),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            FieldType::Object => 2,
            FieldType::Boolean => 4,
            FieldType::Char => 5,
            FieldType::Float => 6,
            FieldType::Double => 7,
            FieldType::Byte => 8,
            FieldType::Short => 9,
            FieldType::Int => 10,
            FieldType::Long => 11,
        }
    }

    /// Encoded width of one value of this type
    pub fn width(self, id_size: IdSize) -> usize {
        match self {
            FieldType::Object => id_size.bytes(),
            FieldType::Boolean | FieldType::Byte => 1,
            FieldType::Char | FieldType::Short => 2,
            FieldType::Float | FieldType::Int => 4,
            FieldType::Double | FieldType::Long => 8,
        }
    }

    pub fn is_reference(self) -> bool {
        self == FieldType::Object
    }

    /// Java source name of the type
    pub fn name(self) -> &'static str {
        match self {
            FieldType::Object => "object",
            FieldType::Boolean => "boolean",
            FieldType::Char => "char",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Byte => "byte",
            FieldType::Short => "short",
            FieldType::Int => "int",
            FieldType::Long => "long",
        }
    }

    /// Display name of a primitive array of this type, e.g. `byte[]`
    pub fn array_name(self) -> String {
        format!("{}[]", self.name())
    }
}

/// Kind of GC root
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootKind {
    Unknown,
    JniGlobal,
    JniLocal,
    JavaFrame,
    NativeStack,
    StickyClass,
    ThreadBlock,
    MonitorUsed,
    ThreadObject,
    InternedString,
    Finalizing,
    Debugger,
    ReferenceCleanup,
    VmInternal,
    JniMonitor,
    Unreachable,
}

impl RootKind {
    pub const ALL: [RootKind; 16] = [
        RootKind::Unknown,
        RootKind::JniGlobal,
        RootKind::JniLocal,
        RootKind::JavaFrame,
        RootKind::NativeStack,
        RootKind::StickyClass,
        RootKind::ThreadBlock,
        RootKind::MonitorUsed,
        RootKind::ThreadObject,
        RootKind::InternedString,
        RootKind::Finalizing,
        RootKind::Debugger,
        RootKind::ReferenceCleanup,
        RootKind::VmInternal,
        RootKind::JniMonitor,
        RootKind::Unreachable,
    ];

    /// Decode a heap-dump sub-record tag that introduces a GC root
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.tag() == tag)
    }

    pub fn tag(self) -> u8 {
        match self {
            RootKind::Unknown => 0xff,
            RootKind::JniGlobal => 0x01,
            RootKind::JniLocal => 0x02,
            RootKind::JavaFrame => 0x03,
            RootKind::NativeStack => 0x04,
            RootKind::StickyClass => 0x05,
            RootKind::ThreadBlock => 0x06,
            RootKind::MonitorUsed => 0x07,
            RootKind::ThreadObject => 0x08,
            RootKind::InternedString => 0x89,
            RootKind::Finalizing => 0x8a,
            RootKind::Debugger => 0x8b,
            RootKind::ReferenceCleanup => 0x8c,
            RootKind::VmInternal => 0x8d,
            RootKind::JniMonitor => 0x8e,
            RootKind::Unreachable => 0x90,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RootKind::Unknown => "unknown",
            RootKind::JniGlobal => "jni-global",
            RootKind::JniLocal => "jni-local",
            RootKind::JavaFrame => "java-frame",
            RootKind::NativeStack => "native-stack",
            RootKind::StickyClass => "sticky-class",
            RootKind::ThreadBlock => "thread-block",
            RootKind::MonitorUsed => "monitor-used",
            RootKind::ThreadObject => "thread-object",
            RootKind::InternedString => "interned-string",
            RootKind::Finalizing => "finalizing",
            RootKind::Debugger => "debugger",
            RootKind::ReferenceCleanup => "reference-cleanup",
            RootKind::VmInternal => "vm-internal",
            RootKind::JniMonitor => "jni-monitor",
            RootKind::Unreachable => "unreachable",
        }
    }
}

/// Kind-specific metadata carried by a GC root record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootDetail {
    None,
    JniGlobal {
        jni_ref: Identifier,
    },
    Frame {
        thread_serial: u32,
        frame_number: u32,
    },
    Thread {
        thread_serial: u32,
    },
    ThreadObject {
        thread_serial: u32,
        stack_trace_serial: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GcRoot {
    pub object_id: Identifier,
    pub kind: RootKind,
    pub detail: RootDetail,
}

/// Declared instance field (layout metadata only)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name_id: Identifier,
    pub field_type: FieldType,
}

/// Static field with its value; references are kept as raw identifier bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticField {
    pub name_id: Identifier,
    pub field_type: FieldType,
    pub value: u64,
}

impl StaticField {
    /// The referenced object, if this is a non-null reference field
    pub fn reference(&self) -> Option<Identifier> {
        (self.field_type.is_reference() && self.value != 0).then_some(Identifier(self.value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassRecord {
    pub id: Identifier,
    pub name: String,
    pub super_class_id: Identifier,
    pub instance_size: u32,
    pub static_fields: Vec<StaticField>,
    pub instance_fields: Vec<FieldDef>,
    pub shallow_size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRecord {
    pub id: Identifier,
    pub class_id: Identifier,
    pub data: Vec<u8>,
    pub shallow_size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectArrayRecord {
    pub id: Identifier,
    pub element_class_id: Identifier,
    pub elements: Vec<Identifier>,
    pub shallow_size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveArrayRecord {
    pub id: Identifier,
    pub element_type: FieldType,
    pub length: u32,
    /// Empty when the producer omitted array contents
    pub data: Vec<u8>,
    pub shallow_size: u64,
}

/// Coarse object category used in result tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Class,
    Instance,
    ObjectArray,
    PrimitiveArray,
}

/// Decoded heap object
#[derive(Debug, Clone, PartialEq)]
pub enum HeapObject {
    Class(ClassRecord),
    Instance(InstanceRecord),
    ObjectArray(ObjectArrayRecord),
    PrimitiveArray(PrimitiveArrayRecord),
}

impl HeapObject {
    pub fn id(&self) -> Identifier {
        match self {
            HeapObject::Class(c) => c.id,
            HeapObject::Instance(i) => i.id,
            HeapObject::ObjectArray(a) => a.id,
            HeapObject::PrimitiveArray(a) => a.id,
        }
    }

    pub fn shallow_size(&self) -> u64 {
        match self {
            HeapObject::Class(c) => c.shallow_size,
            HeapObject::Instance(i) => i.shallow_size,
            HeapObject::ObjectArray(a) => a.shallow_size,
            HeapObject::PrimitiveArray(a) => a.shallow_size,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            HeapObject::Class(_) => ObjectKind::Class,
            HeapObject::Instance(_) => ObjectKind::Instance,
            HeapObject::ObjectArray(_) => ObjectKind::ObjectArray,
            HeapObject::PrimitiveArray(_) => ObjectKind::PrimitiveArray,
        }
    }

    pub fn as_class(&self) -> Option<&ClassRecord> {
        match self {
            HeapObject::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&InstanceRecord> {
        match self {
            HeapObject::Instance(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_primitive_array(&self) -> Option<&PrimitiveArrayRecord> {
        match self {
            HeapObject::PrimitiveArray(a) => Some(a),
            _ => None,
        }
    }
}

/// Normalize a class name as written by JVM or ART producers
///
/// `java/lang/String` becomes `java.lang.String`, array descriptors such as
/// `[Ljava/lang/Object;` or `[[I` become `java.lang.Object[]` / `int[][]`.
pub fn normalize_class_name(raw: &str) -> String {
    let dims = raw.bytes().take_while(|&b| b == b'[').count();
    if dims == 0 {
        return raw.replace('/', ".");
    }

    let element = &raw[dims..];
    let base = match element {
        "Z" => "boolean".to_string(),
        "B" => "byte".to_string(),
        "C" => "char".to_string(),
        "S" => "short".to_string(),
        "I" => "int".to_string(),
        "J" => "long".to_string(),
        "F" => "float".to_string(),
        "D" => "double".to_string(),
        other => other
            .strip_prefix('L')
            .and_then(|s| s.strip_suffix(';'))
            .unwrap_or(other)
            .replace('/', "."),
    };
    format!("{}{}", base, "[]".repeat(dims))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_widths() {
        assert_eq!(FieldType::Object.width(IdSize::Four), 4);
        assert_eq!(FieldType::Object.width(IdSize::Eight), 8);
        assert_eq!(FieldType::Boolean.width(IdSize::Eight), 1);
        assert_eq!(FieldType::Char.width(IdSize::Four), 2);
        assert_eq!(FieldType::Float.width(IdSize::Four), 4);
        assert_eq!(FieldType::Long.width(IdSize::Four), 8);
    }

    #[test]
    fn test_field_type_tags() {
        for tag in 0u8..=255 {
            if let Some(ty) = FieldType::from_tag(tag) {
                assert_eq!(ty.tag(), tag);
            }
        }
        assert_eq!(FieldType::from_tag(3), None);
        assert_eq!(FieldType::from_tag(1), None);
    }

    #[test]
    fn test_root_kind_tags_unique() {
        for kind in RootKind::ALL {
            assert_eq!(RootKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(RootKind::from_tag(0x20), None);
        assert_eq!(RootKind::from_tag(0xfe), None);
    }

    #[test]
    fn test_static_field_reference() {
        let field = StaticField {
            name_id: Identifier(1),
            field_type: FieldType::Object,
            value: 0x40,
        };
        assert_eq!(field.reference(), Some(Identifier(0x40)));

        let null = StaticField { value: 0, ..field };
        assert_eq!(null.reference(), None);

        let int = StaticField {
            field_type: FieldType::Int,
            ..field
        };
        assert_eq!(int.reference(), None);
    }

    #[test]
    fn test_normalize_class_name() {
        assert_eq!(normalize_class_name("java/lang/String"), "java.lang.String");
        assert_eq!(normalize_class_name("java.lang.String"), "java.lang.String");
        assert_eq!(
            normalize_class_name("[Ljava/lang/Object;"),
            "java.lang.Object[]"
        );
        assert_eq!(normalize_class_name("[[I"), "int[][]");
        assert_eq!(normalize_class_name("byte[]"), "byte[]");
    }

    #[test]
    fn test_identifier_display() {
        assert_eq!(Identifier(255).to_string(), "0xff");
        assert!(Identifier::NULL.is_null());
    }
}
