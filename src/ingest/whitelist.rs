use std::collections::HashSet;

/// Allow-list of source channels. An empty list admits every channel.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    ids: HashSet<i64>,
}

impl Whitelist {
    pub fn new(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn allowed(&self, channel_id: i64) -> bool {
        self.ids.is_empty() || self.ids.contains(&channel_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
