#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::file::File;

/// Settings applied to a [`File`] right after it adopts its descriptor.
///
/// The default leaves the stream exactly as the C runtime set it up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "enable-serde", serde(default))]
pub struct FileOptions {
    /// Stream buffer size in bytes; `0` disables buffering.
    pub buffer_size: Option<usize>,
}

impl FileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    pub(crate) fn apply(&self, file: &mut File) -> Result<()> {
        if let Some(size) = self.buffer_size {
            file.set_buffer_size(size)?;
        }
        Ok(())
    }
}

#[cfg(all(test, feature = "enable-serde"))]
mod tests {
    use super::*;

    #[test]
    fn deserialize_with_missing_fields() {
        let options: FileOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, FileOptions::default());

        let options: FileOptions = serde_json::from_str(r#"{"buffer_size": 4096}"#).unwrap();
        assert_eq!(options, FileOptions::new().buffer_size(4096));
    }
}
