//! Decoding of the OBS `not-gor` response into a [`GradeTable`].
//!
//! The response lists, per student unit, the enrolled courses with one item
//! per assessment, and separately the assessment type names. Item `i` of a
//! course belongs to assessment type `i` of the *first* unit's type list.

use crate::error::FetchError;
use crate::types::GradeTable;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct GradeResponse {
    ogrenci_birim_list: Vec<StudentUnit>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StudentUnit {
    tnotlar_notes: Vec<CourseNotes>,
    sinav_turleri_list: LabeledItems,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CourseNotes {
    label_view_model: LabelViewModel,
    not_tree_set: LabeledItems,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LabeledItems {
    items: Vec<LabeledItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LabeledItem {
    label_view_model: LabelViewModel,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LabelViewModel {
    language_map: LanguageMap,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LanguageMap {
    #[serde(rename = "EN")]
    en: Option<String>,
}

impl LabelViewModel {
    fn english(&self) -> &str {
        self.language_map.en.as_deref().unwrap_or_default().trim()
    }
}

impl GradeResponse {
    fn into_table(self) -> GradeTable {
        let mut table = GradeTable::new();
        let assessment_types: Vec<String> = self
            .ogrenci_birim_list
            .first()
            .map(|unit| {
                unit.sinav_turleri_list
                    .items
                    .iter()
                    .map(|item| item.label_view_model.english().to_owned())
                    .collect()
            })
            .unwrap_or_default();

        for unit in &self.ogrenci_birim_list {
            for course in &unit.tnotlar_notes {
                let course_name = course.label_view_model.english();
                if course_name.is_empty() {
                    continue;
                }
                table.ensure_course(course_name);

                for (index, item) in course.not_tree_set.items.iter().enumerate() {
                    let Some(assessment) = assessment_types.get(index) else {
                        tracing::debug!(
                            course = course_name,
                            index,
                            "grade item without assessment type, skipping"
                        );
                        continue;
                    };
                    if assessment.is_empty() {
                        continue;
                    }
                    table.insert(course_name, assessment.as_str(), item.label_view_model.english());
                }
            }
        }

        table
    }
}

/// Parse an OBS grade response body into a [`GradeTable`].
///
/// Extracted as a separate function for testability with canned bodies.
///
/// # Errors
///
/// Returns [`FetchError::Decode`] if the body is not JSON or does not have
/// the expected shape.
pub fn parse_grades(body: &str) -> Result<GradeTable, FetchError> {
    let response: GradeResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::Decode(format!("invalid grade response: {e}")))?;
    Ok(response.into_table())
}
