use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

/// Stable sort on `key`; rows without a key go last in either direction.
pub fn sort_records<T, K, F>(items: &mut [T], direction: SortDirection, mut key: F)
where
    K: Ord,
    F: FnMut(&T) -> Option<K>,
{
    items.sort_by(|a, b| match (key(a), key(b)) {
        (Some(x), Some(y)) => match direction {
            SortDirection::Asc => x.cmp(&y),
            SortDirection::Desc => y.cmp(&x),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_sort_last_both_ways() {
        let mut items = vec![Some(2), None, Some(1), Some(3)];
        sort_records(&mut items, SortDirection::Asc, |v| *v);
        assert_eq!(items, vec![Some(1), Some(2), Some(3), None]);

        sort_records(&mut items, SortDirection::Desc, |v| *v);
        assert_eq!(items, vec![Some(3), Some(2), Some(1), None]);
    }
}
