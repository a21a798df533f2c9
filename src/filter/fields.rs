use serde::{Deserialize, Serialize};

use super::TimeWindow;
use crate::error::{CrmError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Describes one control of a filter bar. Each kind carries exactly the
/// parameters it needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterField {
    Text {
        key: String,
        label: String,
        placeholder: String,
    },
    Select {
        key: String,
        label: String,
        options: Vec<SelectOption>,
    },
    Switch {
        key: String,
        label: String,
    },
    DateRange {
        key: String,
        label: String,
        windows: Vec<TimeWindow>,
    },
}

impl FilterField {
    pub fn key(&self) -> &str {
        match self {
            Self::Text { key, .. }
            | Self::Select { key, .. }
            | Self::Switch { key, .. }
            | Self::DateRange { key, .. } => key,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Text { label, .. }
            | Self::Select { label, .. }
            | Self::Switch { label, .. }
            | Self::DateRange { label, .. } => label,
        }
    }

    /// Checks that `value` is the right kind for this field and, for
    /// selects and ranges, one of the offered choices.
    pub fn accepts(&self, value: &FilterValue) -> Result<()> {
        let ok = match (self, value) {
            (_, FilterValue::Clear) => true,
            (Self::Text { .. }, FilterValue::Text(_)) => true,
            (Self::Switch { .. }, FilterValue::Switch(_)) => true,
            (Self::Select { options, .. }, FilterValue::Select(v)) => {
                options.iter().any(|o| &o.value == v)
            }
            (Self::DateRange { windows, .. }, FilterValue::Window(w)) => windows.contains(w),
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(CrmError::validation(
                self.key(),
                format!("unsupported value {:?}", value),
            ))
        }
    }
}

/// A value coming from a filter control.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FilterValue {
    Text(String),
    Select(String),
    Switch(bool),
    Window(TimeWindow),
    Clear,
}

pub(crate) fn text(key: &str, label: &str, placeholder: &str) -> FilterField {
    FilterField::Text {
        key: key.to_string(),
        label: label.to_string(),
        placeholder: placeholder.to_string(),
    }
}

pub(crate) fn select(key: &str, label: &str, options: Vec<SelectOption>) -> FilterField {
    FilterField::Select {
        key: key.to_string(),
        label: label.to_string(),
        options,
    }
}

pub(crate) fn switch(key: &str, label: &str) -> FilterField {
    FilterField::Switch {
        key: key.to_string(),
        label: label.to_string(),
    }
}

pub(crate) fn date_range(key: &str, label: &str) -> FilterField {
    FilterField::DateRange {
        key: key.to_string(),
        label: label.to_string(),
        windows: TimeWindow::ALL.to_vec(),
    }
}

/// Finds `key` among `fields`, failing on unknown keys.
pub(crate) fn field<'a>(fields: &'a [FilterField], key: &str) -> Result<&'a FilterField> {
    fields
        .iter()
        .find(|f| f.key() == key)
        .ok_or_else(|| CrmError::validation(key, "unknown filter"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_accept_only_their_own_kind() {
        let role = select(
            "role",
            "Role",
            vec![SelectOption::new("decision_maker", "Decision maker")],
        );
        assert!(role
            .accepts(&FilterValue::Select("decision_maker".into()))
            .is_ok());
        assert!(role.accepts(&FilterValue::Select("ceo".into())).is_err());
        assert!(role.accepts(&FilterValue::Switch(true)).is_err());
        assert!(role.accepts(&FilterValue::Clear).is_ok());

        let seen = date_range("last_interaction", "Last contact");
        assert!(seen.accepts(&FilterValue::Window(TimeWindow::Never)).is_ok());
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(switch("primary", "Primary only")).unwrap();
        assert_eq!(json["kind"], "switch");
        assert_eq!(json["key"], "primary");
    }
}
