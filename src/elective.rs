use crate::error::{CoreError, CoreResult, FieldIssue};
use crate::model::{ElectiveCategory, Role, Subject};
use crate::remote::{ElectiveWrite, SystemOfRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultyRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectiveOption {
    pub id: String,
    #[serde(default)]
    pub code: String,
    pub name: String,
    #[serde(default, alias = "faculty")]
    pub faculties: Vec<FacultyRef>,
}

/// Subjects (and their faculty sets) offered per elective category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectiveCatalog {
    #[serde(flatten)]
    pub offers: BTreeMap<ElectiveCategory, Vec<ElectiveOption>>,
}

impl ElectiveCatalog {
    /// Build from the workspace subjects offered to one class.
    pub fn from_subjects<'a, I>(subjects: I, class_id: &str) -> Self
    where
        I: IntoIterator<Item = &'a Subject>,
    {
        let mut offers: BTreeMap<ElectiveCategory, Vec<ElectiveOption>> = BTreeMap::new();
        for s in subjects {
            if s.class_id != class_id {
                continue;
            }
            let Some(category) = s.subject_type.elective_category() else {
                continue;
            };
            offers.entry(category).or_default().push(ElectiveOption {
                id: s.id.clone(),
                code: s.code.clone(),
                name: s.name.clone(),
                faculties: s
                    .faculty
                    .iter()
                    .map(|f| FacultyRef {
                        id: f.id.clone(),
                        name: f.name.clone(),
                    })
                    .collect(),
            });
        }
        Self { offers }
    }

    /// Categories offered to this student: those with at least one subject.
    pub fn offered(&self) -> Vec<ElectiveCategory> {
        ElectiveCategory::ALL
            .into_iter()
            .filter(|c| self.offers.get(c).map(|v| !v.is_empty()).unwrap_or(false))
            .collect()
    }

    pub fn option(&self, category: ElectiveCategory, subject_id: &str) -> Option<&ElectiveOption> {
        self.offers
            .get(&category)
            .and_then(|v| v.iter().find(|o| o.id == subject_id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectivePick {
    pub subject_id: Option<String>,
    pub faculty_id: Option<String>,
}

impl ElectivePick {
    pub fn is_empty(&self) -> bool {
        self.subject_id.is_none() && self.faculty_id.is_none()
    }

    pub fn is_complete(&self) -> bool {
        self.subject_id.is_some() && self.faculty_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ElectiveState {
    Unselected,
    PartiallySelected,
    FullySelected,
    Locked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectiveSelection {
    pub student_id: String,
    pub picks: BTreeMap<ElectiveCategory, ElectivePick>,
    pub locked: bool,
}

fn locked_issue(category: Option<ElectiveCategory>) -> CoreError {
    CoreError::invalid(category, "locked", "elective selections are locked")
}

impl ElectiveSelection {
    pub fn new(student_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            picks: BTreeMap::new(),
            locked: false,
        }
    }

    pub fn pick(&self, category: ElectiveCategory) -> ElectivePick {
        self.picks.get(&category).cloned().unwrap_or_default()
    }

    pub fn state(&self, catalog: &ElectiveCatalog) -> ElectiveState {
        if self.locked {
            return ElectiveState::Locked;
        }
        let offered = catalog.offered();
        if offered.iter().all(|c| self.pick(*c).is_complete()) {
            return ElectiveState::FullySelected;
        }
        if offered.iter().all(|c| self.pick(*c).is_empty()) {
            return ElectiveState::Unselected;
        }
        ElectiveState::PartiallySelected
    }

    /// Choosing a subject always clears that category's faculty.
    pub fn select_subject(
        &mut self,
        catalog: &ElectiveCatalog,
        category: ElectiveCategory,
        subject_id: &str,
    ) -> CoreResult<()> {
        if self.locked {
            return Err(locked_issue(Some(category)));
        }
        if !catalog.offered().contains(&category) {
            return Err(CoreError::invalid(
                Some(category),
                "category",
                "not offered to this student",
            ));
        }
        if catalog.option(category, subject_id).is_none() {
            return Err(CoreError::invalid(
                Some(category),
                "subjectId",
                format!("{} is not offered in this category", subject_id),
            ));
        }
        self.picks.insert(
            category,
            ElectivePick {
                subject_id: Some(subject_id.to_string()),
                faculty_id: None,
            },
        );
        Ok(())
    }

    pub fn select_faculty(
        &mut self,
        catalog: &ElectiveCatalog,
        category: ElectiveCategory,
        faculty_id: &str,
    ) -> CoreResult<()> {
        if self.locked {
            return Err(locked_issue(Some(category)));
        }
        let current = self.pick(category);
        let Some(subject_id) = current.subject_id else {
            return Err(CoreError::invalid(
                Some(category),
                "subjectId",
                "select a subject before choosing faculty",
            ));
        };
        let offers_faculty = catalog
            .option(category, &subject_id)
            .map(|o| o.faculties.iter().any(|f| f.id == faculty_id))
            .unwrap_or(false);
        if !offers_faculty {
            return Err(CoreError::invalid(
                Some(category),
                "facultyId",
                format!("{} does not teach {}", faculty_id, subject_id),
            ));
        }
        self.picks.insert(
            category,
            ElectivePick {
                subject_id: Some(subject_id),
                faculty_id: Some(faculty_id.to_string()),
            },
        );
        Ok(())
    }

    /// Every offered category lacking a subject or faculty, in category order.
    pub fn missing_for_lock(&self, catalog: &ElectiveCatalog) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        for c in catalog.offered() {
            let p = self.pick(c);
            if p.subject_id.is_none() {
                issues.push(FieldIssue::new(Some(c), "subjectId", "not selected"));
            } else if p.faculty_id.is_none() {
                issues.push(FieldIssue::new(Some(c), "facultyId", "not selected"));
            }
        }
        issues
    }

    /// Locks every category at once, or nothing.
    pub fn lock(&mut self, catalog: &ElectiveCatalog) -> CoreResult<()> {
        if self.locked {
            return Err(locked_issue(None));
        }
        let issues = self.missing_for_lock(catalog);
        if !issues.is_empty() {
            return Err(CoreError::Validation { issues });
        }
        self.locked = true;
        Ok(())
    }
}

pub fn check_role(role: Option<Role>) -> CoreResult<()> {
    match role {
        Some(r) if !r.may_edit_electives() => Err(CoreError::Forbidden {
            role: r,
            action: "edit electives",
        }),
        _ => Ok(()),
    }
}

/// Applies elective transitions locally first, then asks the system of
/// record; a refusal restores the exact prior state.
pub struct ElectiveController<'a> {
    remote: &'a dyn SystemOfRecord,
}

impl<'a> ElectiveController<'a> {
    pub fn new(remote: &'a dyn SystemOfRecord) -> Self {
        Self { remote }
    }

    /// Draft only: the backend stores a pick once both halves are chosen.
    pub fn select_subject(
        &self,
        selection: &mut ElectiveSelection,
        catalog: &ElectiveCatalog,
        category: ElectiveCategory,
        subject_id: &str,
    ) -> CoreResult<()> {
        selection.select_subject(catalog, category, subject_id)?;
        info!(
            student_id = %selection.student_id,
            category = %category,
            subject_id,
            "elective subject drafted"
        );
        Ok(())
    }

    pub fn select_faculty(
        &self,
        selection: &mut ElectiveSelection,
        catalog: &ElectiveCatalog,
        category: ElectiveCategory,
        faculty_id: &str,
    ) -> CoreResult<()> {
        let before = selection.clone();
        selection.select_faculty(catalog, category, faculty_id)?;

        let pick = selection.pick(category);
        let write = ElectiveWrite {
            student_id: selection.student_id.clone(),
            category,
            subject_id: pick.subject_id.unwrap_or_default(),
            faculty_id: faculty_id.to_string(),
        };
        if let Err(e) = self.remote.confirm_elective(&write) {
            *selection = before;
            warn!(
                student_id = %selection.student_id,
                category = %category,
                error = %e,
                "elective pick rejected, restored"
            );
            return Err(CoreError::from_remote(e));
        }
        info!(
            student_id = %selection.student_id,
            category = %category,
            faculty_id,
            "elective pick confirmed"
        );
        Ok(())
    }

    pub fn lock(
        &self,
        selection: &mut ElectiveSelection,
        catalog: &ElectiveCatalog,
    ) -> CoreResult<()> {
        selection.lock(catalog)?;
        if let Err(e) = self.remote.confirm_lock(&selection.student_id) {
            selection.locked = false;
            warn!(student_id = %selection.student_id, error = %e, "lock rejected, unlocked");
            return Err(CoreError::from_remote(e));
        }
        info!(student_id = %selection.student_id, "elective selections locked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::ScriptedBackend;

    fn option(id: &str, faculty: &[&str]) -> ElectiveOption {
        ElectiveOption {
            id: id.to_string(),
            code: id.to_uppercase(),
            name: id.to_string(),
            faculties: faculty
                .iter()
                .map(|f| FacultyRef {
                    id: f.to_string(),
                    name: f.to_string(),
                })
                .collect(),
        }
    }

    fn catalog() -> ElectiveCatalog {
        let mut offers = BTreeMap::new();
        offers.insert(
            ElectiveCategory::Mdm,
            vec![option("mdm-ai", &["f1", "f2"]), option("mdm-iot", &["f3"])],
        );
        offers.insert(ElectiveCategory::Oe, vec![option("oe-fin", &["f4"])]);
        offers.insert(ElectiveCategory::Pe, Vec::new());
        ElectiveCatalog { offers }
    }

    fn fully_picked() -> ElectiveSelection {
        let cat = catalog();
        let mut sel = ElectiveSelection::new("s1");
        sel.select_subject(&cat, ElectiveCategory::Mdm, "mdm-ai").expect("mdm");
        sel.select_faculty(&cat, ElectiveCategory::Mdm, "f2").expect("mdm faculty");
        sel.select_subject(&cat, ElectiveCategory::Oe, "oe-fin").expect("oe");
        sel.select_faculty(&cat, ElectiveCategory::Oe, "f4").expect("oe faculty");
        sel
    }

    #[test]
    fn states_progress_to_fully_selected() {
        let cat = catalog();
        let mut sel = ElectiveSelection::new("s1");
        assert_eq!(sel.state(&cat), ElectiveState::Unselected);
        sel.select_subject(&cat, ElectiveCategory::Mdm, "mdm-ai").expect("select");
        assert_eq!(sel.state(&cat), ElectiveState::PartiallySelected);
        assert_eq!(fully_picked().state(&cat), ElectiveState::FullySelected);
    }

    #[test]
    fn new_subject_clears_only_that_faculty() {
        let cat = catalog();
        let mut sel = fully_picked();
        sel.select_subject(&cat, ElectiveCategory::Mdm, "mdm-iot").expect("reselect");
        assert_eq!(sel.pick(ElectiveCategory::Mdm).faculty_id, None);
        assert_eq!(
            sel.pick(ElectiveCategory::Oe).faculty_id.as_deref(),
            Some("f4")
        );
    }

    #[test]
    fn faculty_must_belong_to_subject() {
        let cat = catalog();
        let mut sel = ElectiveSelection::new("s1");
        let e = sel
            .select_faculty(&cat, ElectiveCategory::Mdm, "f1")
            .unwrap_err();
        assert_eq!(e.code(), "validation_failed");

        sel.select_subject(&cat, ElectiveCategory::Mdm, "mdm-iot").expect("select");
        let before = sel.clone();
        let e = sel
            .select_faculty(&cat, ElectiveCategory::Mdm, "f1")
            .unwrap_err();
        assert!(e.to_string().contains("facultyId"));
        assert_eq!(sel, before);
    }

    #[test]
    fn unoffered_category_and_subject_are_rejected() {
        let cat = catalog();
        let mut sel = ElectiveSelection::new("s1");
        assert!(sel.select_subject(&cat, ElectiveCategory::Pe, "pe-x").is_err());
        assert!(sel.select_subject(&cat, ElectiveCategory::Oe, "mdm-ai").is_err());
        assert!(sel.picks.is_empty());
    }

    #[test]
    fn lock_lists_every_gap_and_changes_nothing() {
        let cat = catalog();
        let mut sel = ElectiveSelection::new("s1");
        sel.select_subject(&cat, ElectiveCategory::Mdm, "mdm-ai").expect("select");
        let before = sel.clone();

        let err = sel.lock(&cat).unwrap_err();
        match err {
            CoreError::Validation { issues } => {
                assert_eq!(
                    issues,
                    vec![
                        FieldIssue::new(Some(ElectiveCategory::Mdm), "facultyId", "not selected"),
                        FieldIssue::new(Some(ElectiveCategory::Oe), "subjectId", "not selected"),
                    ]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sel, before);
    }

    #[test]
    fn locked_is_terminal() {
        let cat = catalog();
        let mut sel = fully_picked();
        sel.lock(&cat).expect("lock");
        assert_eq!(sel.state(&cat), ElectiveState::Locked);

        let before = sel.clone();
        assert!(sel.select_subject(&cat, ElectiveCategory::Mdm, "mdm-iot").is_err());
        assert!(sel.select_faculty(&cat, ElectiveCategory::Oe, "f4").is_err());
        assert!(sel.lock(&cat).is_err());
        assert_eq!(sel, before);
    }

    #[test]
    fn rejected_faculty_pick_restores_previous_pick() {
        let cat = catalog();
        let backend = ScriptedBackend::rejecting("faculty full").then(Ok(()));
        let ctl = ElectiveController::new(&backend);
        let mut sel = ElectiveSelection::new("s1");
        ctl.select_subject(&mut sel, &cat, ElectiveCategory::Mdm, "mdm-ai")
            .expect("draft");
        ctl.select_faculty(&mut sel, &cat, ElectiveCategory::Mdm, "f1")
            .expect("first pick");
        let err = ctl
            .select_faculty(&mut sel, &cat, ElectiveCategory::Mdm, "f2")
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
        assert_eq!(
            sel.pick(ElectiveCategory::Mdm).faculty_id.as_deref(),
            Some("f1")
        );
        assert_eq!(
            sel.pick(ElectiveCategory::Mdm).subject_id.as_deref(),
            Some("mdm-ai")
        );

        let written = backend.electives();
        let sent: Vec<(&str, &str)> = written
            .iter()
            .map(|w| (w.subject_id.as_str(), w.faculty_id.as_str()))
            .collect();
        assert_eq!(sent, vec![("mdm-ai", "f1"), ("mdm-ai", "f2")]);
    }

    #[test]
    fn rejected_lock_leaves_selection_unlocked() {
        let cat = catalog();
        let backend = ScriptedBackend::rejecting("deadline passed");
        let ctl = ElectiveController::new(&backend);
        let mut sel = fully_picked();
        let err = ctl.lock(&mut sel, &cat).unwrap_err();
        assert_eq!(err.code(), "conflict");
        assert!(!sel.locked);
        assert_eq!(sel.state(&cat), ElectiveState::FullySelected);
    }

    #[test]
    fn confirmed_lock_sends_student_id() {
        let cat = catalog();
        let backend = ScriptedBackend::accepting();
        let ctl = ElectiveController::new(&backend);
        let mut sel = fully_picked();
        ctl.lock(&mut sel, &cat).expect("lock");
        assert!(sel.locked);
        assert_eq!(backend.locks(), vec!["s1".to_string()]);
    }
}
