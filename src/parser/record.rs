pub const TAG_STRING: u8 = 0x01;
pub const TAG_LOAD_CLASS: u8 = 0x02;
pub const TAG_UNLOAD_CLASS: u8 = 0x03;
pub const TAG_STACK_FRAME: u8 = 0x04;
pub const TAG_STACK_TRACE: u8 = 0x05;
pub const TAG_ALLOC_SITES: u8 = 0x06;
pub const TAG_HEAP_SUMMARY: u8 = 0x07;
pub const TAG_START_THREAD: u8 = 0x0A;
pub const TAG_END_THREAD: u8 = 0x0B;
pub const TAG_HEAP_DUMP: u8 = 0x0C;
pub const TAG_CPU_SAMPLES: u8 = 0x0D;
pub const TAG_CONTROL_SETTING: u8 = 0x0E;
pub const TAG_HEAP_DUMP_SEGMENT: u8 = 0x1C;
pub const TAG_HEAP_DUMP_END: u8 = 0x2C;

pub const RECORD_HEADER_LENGTH: usize = 9;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct RecordHeader {
    pub tag: u8,
    pub timestamp: u32,
    pub length: u32,
}

impl RecordHeader {
    pub fn to_bytes(self) -> [u8; RECORD_HEADER_LENGTH] {
        let mut bytes = [0; RECORD_HEADER_LENGTH];
        bytes[0] = self.tag;
        bytes[1..5].copy_from_slice(&self.timestamp.to_be_bytes());
        bytes[5..9].copy_from_slice(&self.length.to_be_bytes());
        bytes
    }

    pub fn is_heap_dump(&self) -> bool {
        self.tag == TAG_HEAP_DUMP || self.tag == TAG_HEAP_DUMP_SEGMENT
    }
}

pub fn tag_name(tag: u8) -> &'static str {
    match tag {
        TAG_STRING => "utf8-string",
        TAG_LOAD_CLASS => "load-class",
        TAG_UNLOAD_CLASS => "unload-class",
        TAG_STACK_FRAME => "stack-frame",
        TAG_STACK_TRACE => "stack-trace",
        TAG_ALLOC_SITES => "allocation-sites",
        TAG_HEAP_SUMMARY => "heap-summary",
        TAG_START_THREAD => "start-thread",
        TAG_END_THREAD => "end-thread",
        TAG_HEAP_DUMP => "heap-dump",
        TAG_CPU_SAMPLES => "cpu-samples",
        TAG_CONTROL_SETTING => "control-settings",
        TAG_HEAP_DUMP_SEGMENT => "heap-dump-segment",
        TAG_HEAP_DUMP_END => "heap-dump-end",
        _ => "unknown",
    }
}

/// Top-level records whose bodies reference string identifiers worth keeping.
#[derive(Debug, PartialEq, Eq)]
pub enum Record {
    LoadClass {
        serial_number: u32,
        class_object_id: u64,
        stack_trace_serial_number: u32,
        class_name_id: u64,
    },
    StackFrame {
        stack_frame_id: u64,
        method_name_id: u64,
        method_signature_id: u64,
        source_file_name_id: u64,
        class_serial_number: u32,
        line_number: u32,
    },
    StartThread {
        thread_serial_number: u32,
        thread_object_id: u64,
        stack_trace_serial_number: u32,
        thread_name_id: u64,
        thread_group_name_id: u64,
        thread_group_parent_name_id: u64,
    },
}
