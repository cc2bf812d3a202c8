// Record and sub-record tag values of the HPROF format.

// Top-level records
pub const STRING: u8 = 0x01;
pub const LOAD_CLASS: u8 = 0x02;
pub const UNLOAD_CLASS: u8 = 0x03;
pub const STACK_FRAME: u8 = 0x04;
pub const STACK_TRACE: u8 = 0x05;
pub const ALLOC_SITES: u8 = 0x06;
pub const HEAP_SUMMARY: u8 = 0x07;
pub const START_THREAD: u8 = 0x0a;
pub const END_THREAD: u8 = 0x0b;
pub const HEAP_DUMP: u8 = 0x0c;
pub const CPU_SAMPLES: u8 = 0x0d;
pub const CONTROL_SETTINGS: u8 = 0x0e;
pub const HEAP_DUMP_SEGMENT: u8 = 0x1c;
pub const HEAP_DUMP_END: u8 = 0x2c;

/// Records whose payload carries nothing needed for memory analysis
pub const SKIPPED_RECORDS: [u8; 10] = [
    UNLOAD_CLASS,
    STACK_FRAME,
    STACK_TRACE,
    ALLOC_SITES,
    HEAP_SUMMARY,
    START_THREAD,
    END_THREAD,
    HEAP_DUMP_END,
    CPU_SAMPLES,
    CONTROL_SETTINGS,
];

// Heap-dump sub-records (GC root tags live on `RootKind`)
pub const CLASS_DUMP: u8 = 0x20;
pub const INSTANCE_DUMP: u8 = 0x21;
pub const OBJECT_ARRAY_DUMP: u8 = 0x22;
pub const PRIMITIVE_ARRAY_DUMP: u8 = 0x23;
pub const PRIMITIVE_ARRAY_NODATA: u8 = 0xc3;
pub const HEAP_DUMP_INFO: u8 = 0xfe;
