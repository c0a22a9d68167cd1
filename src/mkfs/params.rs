pub const DEFAULT_BLOCKS: u32 = 128;
pub const DEFAULT_INODES: u32 = 32;
pub const LABEL_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MkfsParams {
    pub total_blocks: u32,
    pub inodes: u32,
    pub label: [u8; LABEL_LEN],
}

impl MkfsParams {
    pub fn new(total_blocks: u32, inodes: u32) -> Self {
        Self {
            total_blocks,
            inodes,
            ..Self::default()
        }
    }

    /// Label bytes past the sixteenth are dropped.
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = [0; LABEL_LEN];
        let bytes = label.as_bytes();
        let len = bytes.len().min(LABEL_LEN);
        self.label[..len].copy_from_slice(&bytes[..len]);
        self
    }
}

impl Default for MkfsParams {
    fn default() -> Self {
        Self {
            total_blocks: DEFAULT_BLOCKS,
            inodes: DEFAULT_INODES,
            label: *b"miku\0\0\0\0\0\0\0\0\0\0\0\0",
        }
    }
}
