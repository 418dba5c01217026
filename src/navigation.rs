use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NavigationError {
    #[error("cannot navigate an empty list")]
    Empty,
    #[error("index {index} out of range for {len} items")]
    OutOfRange { index: usize, len: usize },
}

/// Position inside an ordered, non-empty set of items. Clamped at both ends,
/// never wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GalleryCursor {
    item_count: usize,
    index: usize,
}

impl GalleryCursor {
    pub fn new(item_count: usize) -> Result<Self, NavigationError> {
        if item_count == 0 {
            return Err(NavigationError::Empty);
        }
        Ok(Self {
            item_count,
            index: 0,
        })
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.item_count
    }

    #[must_use]
    pub fn advance(self) -> Self {
        if self.is_last() {
            return self;
        }
        Self {
            index: self.index + 1,
            ..self
        }
    }

    #[must_use]
    pub fn retreat(self) -> Self {
        Self {
            index: self.index.saturating_sub(1),
            ..self
        }
    }

    pub fn jump_to(self, index: usize) -> Result<Self, NavigationError> {
        if index >= self.item_count {
            return Err(NavigationError::OutOfRange {
                index,
                len: self.item_count,
            });
        }
        Ok(Self { index, ..self })
    }

    pub fn indicators(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.item_count).map(move |idx| idx == self.index)
    }

    pub fn position(&self) -> String {
        format!("{}/{}", self.index + 1, self.item_count)
    }
}
