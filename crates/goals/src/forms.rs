//! Per-form interaction statistics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Step of a visitor's interaction with a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FormAction {
    View,
    Start,
    FieldFocus { field: String },
    Submit,
}

impl FormAction {
    /// Parses the action names used by host pages.
    pub fn parse(action: &str, field: Option<&str>) -> Option<Self> {
        match action {
            "view" => Some(Self::View),
            "start" => Some(Self::Start),
            "focus" | "field_focus" => field.map(|f| Self::FieldFocus {
                field: f.to_string(),
            }),
            "submit" | "submission" => Some(Self::Submit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormStats {
    pub views: u64,
    pub starts: u64,
    pub submissions: u64,
    /// `submissions / views`, refreshed on every submission
    pub conversion_rate: f64,
    pub field_focus: BTreeMap<String, u64>,
    /// Abandonments keyed by the last field focused before leaving
    pub abandonments: BTreeMap<String, u64>,
    #[serde(skip)]
    in_progress: bool,
    #[serde(skip)]
    last_field: Option<String>,
}

impl FormStats {
    pub fn apply(&mut self, action: &FormAction) {
        match action {
            FormAction::View => self.views += 1,
            FormAction::Start => {
                self.starts += 1;
                self.in_progress = true;
            }
            FormAction::FieldFocus { field } => {
                *self.field_focus.entry(field.clone()).or_default() += 1;
                self.in_progress = true;
                self.last_field = Some(field.clone());
            }
            FormAction::Submit => {
                self.submissions += 1;
                self.conversion_rate = if self.views == 0 {
                    0.0
                } else {
                    self.submissions as f64 / self.views as f64
                };
                self.in_progress = false;
                self.last_field = None;
            }
        }
    }

    /// Called when the page is hidden or closed. Counts an abandonment at
    /// the last focused field if the form was started but not submitted.
    pub fn abandon(&mut self) -> Option<String> {
        if !self.in_progress {
            return None;
        }
        self.in_progress = false;
        let field = self.last_field.take()?;
        *self.abandonments.entry(field.clone()).or_default() += 1;
        Some(field)
    }
}
