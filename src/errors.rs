use thiserror::Error;

#[derive(Debug, Error)]
pub enum HprofStripError {
    #[error("input file not found: {name}")]
    InputFileNotFound { name: String },
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("truncated input: {needed} more bytes needed at offset {offset}")]
    TruncatedInput { offset: u64, needed: u64 },
    #[error("I/O error: {e}")]
    StdIoError {
        #[from]
        e: std::io::Error,
    },
    #[error(transparent)]
    ClapError {
        #[from]
        e: clap::Error,
    },
    #[error("JSON error: {e}")]
    JsonError {
        #[from]
        e: serde_json::Error,
    },
}

/// Structural problems in the dump. All of them abort the run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("incorrect hprof header {found:?}")]
    BadMagic { found: String },
    #[error("unsupported identifier size {id_size}")]
    UnsupportedIdSize { id_size: u32 },
    #[error("class {class_object_id:#x} has a non empty constant pool ({size} entries) @ {offset}")]
    NonEmptyConstantPool {
        class_object_id: u64,
        size: u16,
        offset: u64,
    },
    #[error("unhandled heap dump sub-record tag {tag:#04x} @ {offset}")]
    UnknownSubRecordTag { tag: u8, offset: u64 },
    #[error("field type {value} not found @ {offset}")]
    UnknownFieldType { value: i8, offset: u64 },
    #[error("record with tag {tag:#04x} has length {length}, expected at least {expected} @ {offset}")]
    RecordTooShort {
        tag: u8,
        length: u32,
        expected: u32,
        offset: u64,
    },
    #[error("heap dump sub-record overruns its section ending at {section_end} @ {offset}")]
    SectionOverrun { section_end: u64, offset: u64 },
    #[error("no class layout available for class {class_object_id:#x} of object {object_id:#x} @ {offset}")]
    UnresolvedClassLayout {
        object_id: u64,
        class_object_id: u64,
        offset: u64,
    },
    #[error("cyclic superclass chain starting at class {class_object_id:#x}")]
    CyclicClassHierarchy { class_object_id: u64 },
    #[error("instance {object_id:#x} stores {declared} bytes but its class layout needs {computed} @ {offset}")]
    InstanceLayoutMismatch {
        object_id: u64,
        declared: u32,
        computed: u64,
        offset: u64,
    },
    #[error("output out of frame: emitted {emitted} bytes for {consumed} consumed")]
    OutOfFrame { emitted: u64, consumed: u64 },
    #[error("malformed {what} @ {offset}")]
    Malformed { what: &'static str, offset: u64 },
}
