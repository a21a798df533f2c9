use std::collections::BTreeSet;
use uuid::Uuid;

/// Row ids ticked in a table. Survives refetches; call [`Selection::retain`]
/// after a list changes to drop rows that are gone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: BTreeSet<Uuid>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the row is selected afterwards.
    pub fn toggle(&mut self, id: Uuid) -> bool {
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    pub fn select(&mut self, id: Uuid) {
        self.ids.insert(id);
    }

    pub fn deselect(&mut self, id: Uuid) {
        self.ids.remove(&id);
    }

    pub fn select_all(&mut self, ids: impl IntoIterator<Item = Uuid>) {
        self.ids.extend(ids);
    }

    pub fn select_none(&mut self) {
        self.ids.clear();
    }

    /// Header checkbox: selects every visible row, or clears when they are
    /// all selected already.
    pub fn toggle_all(&mut self, visible: &[Uuid]) {
        if self.all_selected(visible) {
            for id in visible {
                self.ids.remove(id);
            }
        } else {
            self.select_all(visible.iter().copied());
        }
    }

    pub fn all_selected(&self, visible: &[Uuid]) -> bool {
        !visible.is_empty() && visible.iter().all(|id| self.ids.contains(id))
    }

    /// Some but not all visible rows are selected.
    pub fn is_partial(&self, visible: &[Uuid]) -> bool {
        let selected = visible.iter().filter(|id| self.ids.contains(id)).count();
        selected > 0 && selected < visible.len()
    }

    pub fn retain(&mut self, existing: &[Uuid]) {
        self.ids.retain(|id| existing.contains(id));
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.ids.contains(id)
    }

    /// Selected ids in stable order.
    pub fn ids(&self) -> Vec<Uuid> {
        self.ids.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_and_header_checkbox() {
        let rows: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut selection = Selection::new();

        assert!(selection.toggle(rows[0]));
        assert!(selection.is_partial(&rows));
        assert!(!selection.toggle(rows[0]));
        assert!(selection.is_empty());

        selection.toggle_all(&rows);
        assert!(selection.all_selected(&rows));
        selection.toggle_all(&rows);
        assert!(selection.is_empty());
    }

    #[test]
    fn retain_drops_rows_that_left_the_list() {
        let rows: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut selection = Selection::new();
        selection.select_all(rows.clone());

        selection.retain(&rows[1..]);
        assert_eq!(selection.len(), 2);
        assert!(!selection.contains(&rows[0]));
    }
}
