use crate::Bounds;

/// Oldest entries are dropped beyond this length.
pub const MAX_ZOOM_HISTORY: usize = 100;

/// Linear back/forward history of map extents, like browser history.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ZoomHistory {
    entries: Vec<Bounds>,
    index: Option<usize>,
}

impl ZoomHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bounds` after the current position, discarding any forward entries.
    pub fn push(&mut self, bounds: Bounds) {
        match self.index {
            Some(index) => self.entries.truncate(index + 1),
            None => self.entries.clear(),
        }
        self.entries.push(bounds);
        if self.entries.len() > MAX_ZOOM_HISTORY {
            let overflow = self.entries.len() - MAX_ZOOM_HISTORY;
            self.entries.drain(..overflow);
        }
        self.index = Some(self.entries.len() - 1);
    }

    pub fn back(&mut self) -> Option<Bounds> {
        let index = self.index.filter(|&i| i > 0)? - 1;
        self.index = Some(index);
        Some(self.entries[index])
    }

    pub fn forward(&mut self) -> Option<Bounds> {
        let index = self.index.filter(|&i| i + 1 < self.entries.len())? + 1;
        self.index = Some(index);
        Some(self.entries[index])
    }

    pub fn can_go_back(&self) -> bool {
        self.index.is_some_and(|i| i > 0)
    }

    pub fn can_go_forward(&self) -> bool {
        self.index.is_some_and(|i| i + 1 < self.entries.len())
    }

    pub fn current(&self) -> Option<Bounds> {
        self.index.map(|i| self.entries[i])
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn entries(&self) -> &[Bounds] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
