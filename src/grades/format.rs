//! User-facing texts for change notifications and `/get` replies.

use super::diff::ChangeEvent;
use gradewatch_obs::GradeTable;

/// Sent once when a cycle cannot fetch the user's grades.
pub const FETCH_ADVISORY: &str = "Failed to fetch grades. Please check your cookie and donemid. \
                                  You can disable alarms using /alarm false.";

/// Reply when `/get <prefix>` matches no course.
pub const NO_SUCH_COURSE: &str = "No such course found.";

/// Reply when the OBS lists no courses for the term.
pub const NO_COURSES: &str = "No courses found for this term.";

/// Assessment type the OBS uses for the final letter grade.
pub const LETTER_GRADE_ASSESSMENT: &str = "Grade";

/// Notification text for one change event.
#[must_use]
pub fn event_message(event: &ChangeEvent) -> String {
    match event {
        ChangeEvent::Announced {
            course,
            assessment,
            value,
        } => format!("The {assessment} for {course} has been announced: {value}."),
        ChangeEvent::Updated {
            course,
            assessment,
            old_value,
            new_value,
        } => format!("The {assessment} for {course} has been updated from {old_value} to {new_value}."),
    }
}

/// One line per course with its letter grade, or `N/A` when none is out.
#[must_use]
pub fn summary_reply(table: &GradeTable) -> String {
    if table.is_empty() {
        return NO_COURSES.to_owned();
    }
    table
        .courses()
        .map(|(course, grades)| {
            let grade = grades
                .get(LETTER_GRADE_ASSESSMENT)
                .map_or("N/A", String::as_str);
            format!("{course}: {grade}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Detail replies for every course whose name starts with `prefix`.
///
/// Matching ignores ASCII case. Returns one message per matching course;
/// an empty vector means nothing matched.
#[must_use]
pub fn course_replies(table: &GradeTable, prefix: &str) -> Vec<String> {
    let prefix = prefix.trim().to_ascii_lowercase();
    table
        .courses()
        .filter(|(course, _)| course.to_ascii_lowercase().starts_with(&prefix))
        .map(|(course, grades)| {
            let mut reply = format!("Grades for {course}:");
            for (assessment, value) in grades {
                reply.push('\n');
                reply.push_str(&format!("{assessment}: {value}"));
            }
            reply
        })
        .collect()
}
