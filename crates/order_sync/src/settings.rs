use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::{error::PolicyViolation, pagination::DEFAULT_PAGE_SIZE};

pub const DEFAULT_PAGE_SIZE_OPTIONS: [usize; 4] = [5, 10, 20, 50];

/// Presentation settings shared by every view on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSettings {
    pub default_page_size: NonZeroUsize,
    pub page_size_options: Vec<usize>,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            page_size_options: DEFAULT_PAGE_SIZE_OPTIONS.to_vec(),
        }
    }
}

impl ViewSettings {
    /// An empty option list accepts any non-zero size.
    pub fn validate_page_size(&self, size: usize) -> Result<NonZeroUsize, PolicyViolation> {
        let allowed = self.page_size_options.is_empty() || self.page_size_options.contains(&size);
        match NonZeroUsize::new(size) {
            Some(size) if allowed => Ok(size),
            _ => Err(PolicyViolation::PageSizeNotAllowed { size }),
        }
    }
}
