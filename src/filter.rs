use crate::aggregate::{Category, StudentSummary};
use crate::error::{CoreError, CoreResult};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewFilter {
    pub category: Option<Category>,
    pub batch_id: Option<String>,
    pub subject_id: Option<String>,
    pub search: Option<String>,
}

impl ViewFilter {
    pub fn matches(&self, s: &StudentSummary) -> bool {
        let category_ok = self.category.map(|c| s.is_in(c)).unwrap_or(true);
        let batch_ok = self
            .batch_id
            .as_deref()
            .map(|b| s.batch_id.as_deref() == Some(b))
            .unwrap_or(true);
        let subject_ok = self
            .subject_id
            .as_deref()
            .map(|id| s.takes(id))
            .unwrap_or(true);
        let search_ok = self
            .search
            .as_deref()
            .map(|needle| {
                s.name.to_lowercase().contains(needle) || s.roll_no.to_lowercase().contains(needle)
            })
            .unwrap_or(true);
        category_ok && batch_ok && subject_ok && search_ok
    }
}

/// Order-preserving view over `students`; never touches the inputs.
pub fn filter<'a>(students: &'a [StudentSummary], f: &ViewFilter) -> Vec<&'a StudentSummary> {
    students.iter().filter(|s| f.matches(s)).collect()
}

/// Missing, null, empty and "All" (any case) all switch a predicate off.
fn optional_text(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> CoreResult<Option<String>> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(CoreError::invalid(
                    None,
                    format!("filters.{}", key),
                    "must be string or null",
                ));
            };
            let t = s.trim();
            if t.is_empty() || t.eq_ignore_ascii_case("all") {
                Ok(None)
            } else {
                Ok(Some(t.to_string()))
            }
        }
    }
}

pub fn parse_view_filter(raw: Option<&serde_json::Value>) -> CoreResult<ViewFilter> {
    let Some(raw) = raw else {
        return Ok(ViewFilter::default());
    };
    if raw.is_null() {
        return Ok(ViewFilter::default());
    }
    let Some(obj) = raw.as_object() else {
        return Err(CoreError::invalid(None, "filters", "must be an object"));
    };

    let category = match optional_text(obj, "category")? {
        None => None,
        Some(s) => Some(Category::parse(&s).ok_or_else(|| {
            CoreError::invalid(
                None,
                "filters.category",
                "must be one of: All, Regular, Defaulter, Completed",
            )
        })?),
    };

    Ok(ViewFilter {
        category,
        batch_id: optional_text(obj, "batchId")?,
        subject_id: optional_text(obj, "subjectId")?,
        search: optional_text(obj, "search")?.map(|s| s.to_lowercase()),
    })
}
