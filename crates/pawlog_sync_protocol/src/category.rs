//! Log categories and their type-specific fields.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of pet health event a log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Food eaten.
    Meal,
    /// Water intake.
    Water,
    /// A walk.
    Walk,
    /// Play session.
    Play,
    /// Bathroom break.
    Potty,
    /// Sleep period.
    Sleep,
    /// Grooming.
    Grooming,
    /// Medication given. Notes carry the medication name.
    Medication,
    /// Weight measurement. Quantity is required.
    Weight,
    /// Observed symptom. Severity is required.
    Symptom,
    /// Veterinary visit.
    VetVisit,
    /// Free-form note.
    Note,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 12] = [
        Category::Meal,
        Category::Water,
        Category::Walk,
        Category::Play,
        Category::Potty,
        Category::Sleep,
        Category::Grooming,
        Category::Medication,
        Category::Weight,
        Category::Symptom,
        Category::VetVisit,
        Category::Note,
    ];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Category::Meal => "meal",
            Category::Water => "water",
            Category::Walk => "walk",
            Category::Play => "play",
            Category::Potty => "potty",
            Category::Sleep => "sleep",
            Category::Grooming => "grooming",
            Category::Medication => "medication",
            Category::Weight => "weight",
            Category::Symptom => "symptom",
            Category::VetVisit => "vet_visit",
            Category::Note => "note",
        }
    }

    /// Whether entries of this category must carry a quantity.
    #[must_use]
    pub const fn requires_quantity(self) -> bool {
        matches!(self, Category::Weight)
    }

    /// Whether entries of this category must carry a severity.
    #[must_use]
    pub const fn requires_severity(self) -> bool {
        matches!(self, Category::Symptom)
    }

    /// Whether entries of this category must carry notes text.
    #[must_use]
    pub const fn requires_notes(self) -> bool {
        matches!(self, Category::Medication | Category::Note)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

/// Optional fields whose meaning depends on the category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFields {
    /// Amount (grams of food, millilitres of water, kilograms, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    /// Unit for `quantity`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Duration in minutes (walks, play, sleep).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    /// Severity from 1 (mild) to 5 (severe).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<u8>,
    /// Free text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl LogFields {
    /// Sets the quantity and its unit.
    #[must_use]
    pub fn with_quantity(mut self, quantity: f64, unit: impl Into<String>) -> Self {
        self.quantity = Some(quantity);
        self.unit = Some(unit.into());
        self
    }

    /// Sets the duration in minutes.
    #[must_use]
    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    /// Sets the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: u8) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Sets the notes text.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}
