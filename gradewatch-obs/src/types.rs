//! Normalised grade table returned by the OBS client.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value the OBS uses for an assessment that has not been graded yet.
pub const NOT_ANNOUNCED_PLACEHOLDER: &str = "--";

/// Assessment types of one course, keyed by assessment name.
pub type CourseGrades = BTreeMap<String, String>;

type RawGradeTable = BTreeMap<String, CourseGrades>;

/// A user's grades: course → assessment type → value.
///
/// A `(course, assessment)` pair is only ever present with an announced
/// value. Absence of the key is what encodes "not graded yet"; empty strings
/// and the `--` placeholder are dropped on insert and on deserialization.
///
/// Courses are kept in a [`BTreeMap`] so iteration order, stored JSON and
/// rendered replies are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawGradeTable", into = "RawGradeTable")]
pub struct GradeTable {
    courses: RawGradeTable,
}

impl GradeTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when `value` is an actual grade rather than a
    /// "not announced" marker.
    pub fn is_announced(value: &str) -> bool {
        let trimmed = value.trim();
        !trimmed.is_empty() && trimmed != NOT_ANNOUNCED_PLACEHOLDER
    }

    /// Register a course without any graded assessment.
    pub fn ensure_course(&mut self, course: impl Into<String>) -> &mut CourseGrades {
        self.courses.entry(course.into()).or_default()
    }

    /// Record a grade. Returns `false` (and stores nothing but the course)
    /// when `value` is empty or the placeholder.
    pub fn insert(
        &mut self,
        course: impl Into<String>,
        assessment: impl Into<String>,
        value: impl Into<String>,
    ) -> bool {
        let value = value.into();
        let grades = self.ensure_course(course);
        if !Self::is_announced(&value) {
            return false;
        }
        grades.insert(assessment.into(), value.trim().to_owned());
        true
    }

    /// Builder-style [`insert`](Self::insert), handy for fixtures.
    #[must_use]
    pub fn with(
        mut self,
        course: impl Into<String>,
        assessment: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.insert(course, assessment, value);
        self
    }

    /// Grades for one course, if the course is listed.
    pub fn course(&self, course: &str) -> Option<&CourseGrades> {
        self.courses.get(course)
    }

    /// A single grade value.
    pub fn get(&self, course: &str, assessment: &str) -> Option<&str> {
        self.courses
            .get(course)
            .and_then(|grades| grades.get(assessment))
            .map(String::as_str)
    }

    /// Iterate courses in name order.
    pub fn courses(&self) -> impl Iterator<Item = (&str, &CourseGrades)> {
        self.courses
            .iter()
            .map(|(course, grades)| (course.as_str(), grades))
    }

    /// Number of listed courses.
    pub fn len(&self) -> usize {
        self.courses.len()
    }

    /// `true` when no course is listed at all.
    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    /// Total number of announced grades across all courses.
    pub fn grade_count(&self) -> usize {
        self.courses.values().map(BTreeMap::len).sum()
    }
}

impl From<RawGradeTable> for GradeTable {
    fn from(raw: RawGradeTable) -> Self {
        let mut table = GradeTable::new();
        for (course, grades) in raw {
            table.ensure_course(course.clone());
            for (assessment, value) in grades {
                table.insert(course.clone(), assessment, value);
            }
        }
        table
    }
}

impl From<GradeTable> for RawGradeTable {
    fn from(table: GradeTable) -> Self {
        table.courses
    }
}
