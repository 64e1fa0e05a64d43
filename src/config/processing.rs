use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Text extraction and chunking parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Window size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between consecutive windows.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Documents larger than this are not indexed.
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: usize,

    /// PDF extraction gives up after this many seconds.
    #[serde(default = "default_extraction_timeout")]
    pub extraction_timeout_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_file_size_bytes: default_max_file_size(),
            extraction_timeout_secs: default_extraction_timeout(),
        }
    }
}

impl ProcessingConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Validation(
                "processing.chunk_size must be greater than 0".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Validation(format!(
                "processing.chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_max_file_size() -> usize {
    10 * 1024 * 1024 // 10 MB
}

fn default_extraction_timeout() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1000, 200, true)]
    #[case(1000, 999, true)]
    #[case(1000, 1000, false)]
    #[case(100, 500, false)]
    #[case(0, 0, false)]
    fn test_overlap_must_be_smaller(
        #[case] chunk_size: usize,
        #[case] chunk_overlap: usize,
        #[case] ok: bool,
    ) {
        let config = ProcessingConfig {
            chunk_size,
            chunk_overlap,
            ..Default::default()
        };
        assert_eq!(config.validate().is_ok(), ok);
    }
}
