//! Change detection between two grade snapshots.

use gradewatch_obs::GradeTable;
use serde::Serialize;

/// What a diff compares against.
///
/// A user whose grades were never fetched successfully has no baseline, and
/// the first successful fetch only establishes one. Without this distinction
/// every grade on a first fetch would be reported as newly announced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Baseline {
    /// Nothing to compare against yet.
    #[default]
    NoBaseline,
    /// The last persisted snapshot.
    Established(GradeTable),
}

impl Baseline {
    /// Build a baseline from what the store returned.
    ///
    /// An empty stored table counts as no baseline: it is what a user looks
    /// like before the OBS lists any courses for the term.
    #[must_use]
    pub fn from_stored(snapshot: Option<GradeTable>) -> Self {
        match snapshot {
            Some(table) if !table.is_empty() => Self::Established(table),
            _ => Self::NoBaseline,
        }
    }

    /// The baseline table, if one is established.
    #[must_use]
    pub fn table(&self) -> Option<&GradeTable> {
        match self {
            Self::NoBaseline => None,
            Self::Established(table) => Some(table),
        }
    }
}

/// A detected difference between the baseline and a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// A grade appeared that the baseline did not have.
    Announced {
        course: String,
        assessment: String,
        value: String,
    },
    /// A grade present in both snapshots changed value.
    Updated {
        course: String,
        assessment: String,
        old_value: String,
        new_value: String,
    },
}

impl ChangeEvent {
    /// Course the event refers to.
    #[must_use]
    pub fn course(&self) -> &str {
        match self {
            Self::Announced { course, .. } | Self::Updated { course, .. } => course,
        }
    }

    /// Assessment type the event refers to.
    #[must_use]
    pub fn assessment(&self) -> &str {
        match self {
            Self::Announced { assessment, .. } | Self::Updated { assessment, .. } => assessment,
        }
    }

    /// The grade value after the change.
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Announced { value, .. } => value,
            Self::Updated { new_value, .. } => new_value,
        }
    }
}

/// Compare `new` against `old` and list what changed.
///
/// Returns nothing when there is no baseline or when alarms are disabled;
/// the caller persists `new` either way. Grades present in `old` but missing
/// from `new` are not reported. Events follow `new`'s iteration order.
#[must_use]
pub fn diff(old: &Baseline, new: &GradeTable, alarm_enabled: bool) -> Vec<ChangeEvent> {
    let Some(old) = old.table() else {
        return Vec::new();
    };
    if !alarm_enabled || old.is_empty() {
        return Vec::new();
    }

    let mut events = Vec::new();
    for (course, grades) in new.courses() {
        let previous = old.course(course);
        for (assessment, value) in grades {
            match previous.and_then(|p| p.get(assessment)) {
                None => events.push(ChangeEvent::Announced {
                    course: course.to_owned(),
                    assessment: assessment.clone(),
                    value: value.clone(),
                }),
                Some(old_value) if old_value != value => events.push(ChangeEvent::Updated {
                    course: course.to_owned(),
                    assessment: assessment.clone(),
                    old_value: old_value.clone(),
                    new_value: value.clone(),
                }),
                Some(_) => {}
            }
        }
    }
    events
}
