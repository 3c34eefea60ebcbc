use crate::model::{Batch, ClassInfo, Department, Student, Subject, SubjectType};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

/// `roster.import` payload; every section is optional and upserted by id.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterImport {
    #[serde(default)]
    pub departments: Vec<Department>,
    #[serde(default)]
    pub classes: Vec<ClassInfo>,
    #[serde(default)]
    pub batches: Vec<Batch>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub students: Vec<Student>,
}

impl RosterImport {
    pub fn is_empty(&self) -> bool {
        self.departments.is_empty()
            && self.classes.is_empty()
            && self.batches.is_empty()
            && self.subjects.is_empty()
            && self.students.is_empty()
    }
}

/// Reference data the aggregator reads alongside the submission records.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub departments: Vec<Department>,
    pub classes: Vec<ClassInfo>,
    pub batches: Vec<Batch>,
    pub students: Vec<Student>,
    pub subjects: Vec<Subject>,
    /// Student id -> elective subject ids the student currently has picked.
    pub elective_picks: HashMap<String, Vec<String>>,
    /// Real students dropped by `retain_students`; their records are out of
    /// view, not corrupt.
    pub scoped_out: HashSet<String>,
}

impl Roster {
    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn subject(&self, id: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.id == id)
    }

    pub fn class(&self, id: &str) -> Option<&ClassInfo> {
        self.classes.iter().find(|c| c.id == id)
    }

    /// Keep only the students matching `keep`; subjects and classes stay.
    pub fn retain_students<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Student) -> bool,
    {
        let (kept, dropped): (Vec<Student>, Vec<Student>) = std::mem::take(&mut self.students)
            .into_iter()
            .partition(|s| keep(s));
        self.students = kept;
        self.scoped_out.extend(dropped.into_iter().map(|s| s.id));
        let ids: HashSet<&str> = self.students.iter().map(|s| s.id.as_str()).collect();
        self.elective_picks.retain(|sid, _| ids.contains(sid.as_str()));
    }

    pub fn in_scope(&self, student_id: &str) -> bool {
        !self.scoped_out.contains(student_id)
    }

    pub fn class_ids_for_year(&self, year: i64, department_id: Option<&str>) -> HashSet<String> {
        self.classes
            .iter()
            .filter(|c| c.year == year)
            .filter(|c| department_id.is_none() || c.department_id.as_deref() == department_id)
            .map(|c| c.id.clone())
            .collect()
    }

    pub fn enrolment(&self) -> Enrolment<'_> {
        Enrolment::build(self)
    }
}

/// Which subjects each student takes: every theory and practical subject of
/// their class, plus the elective subjects they picked.
#[derive(Debug)]
pub struct Enrolment<'a> {
    subjects_by_id: HashMap<&'a str, &'a Subject>,
    by_student: HashMap<&'a str, Vec<&'a Subject>>,
}

impl<'a> Enrolment<'a> {
    fn build(roster: &'a Roster) -> Self {
        let subjects_by_id: HashMap<&str, &Subject> =
            roster.subjects.iter().map(|s| (s.id.as_str(), s)).collect();

        let mut core_by_class: HashMap<&str, Vec<&Subject>> = HashMap::new();
        for s in &roster.subjects {
            if matches!(s.subject_type, SubjectType::Theory | SubjectType::Practical) {
                core_by_class.entry(s.class_id.as_str()).or_default().push(s);
            }
        }

        let mut by_student: HashMap<&str, Vec<&Subject>> = HashMap::new();
        for st in &roster.students {
            let mut list: Vec<&Subject> = core_by_class
                .get(st.class_id.as_str())
                .cloned()
                .unwrap_or_default();
            if let Some(picks) = roster.elective_picks.get(&st.id) {
                for pick in picks {
                    let Some(subject) = subjects_by_id.get(pick.as_str()) else {
                        continue;
                    };
                    if subject.subject_type.elective_category().is_some()
                        && !list.iter().any(|s| s.id == subject.id)
                    {
                        list.push(subject);
                    }
                }
            }
            by_student.insert(st.id.as_str(), list);
        }

        Self {
            subjects_by_id,
            by_student,
        }
    }

    pub fn subjects_for(&self, student_id: &str) -> &[&'a Subject] {
        self.by_student
            .get(student_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn takes(&self, student_id: &str, subject_id: &str) -> bool {
        self.subjects_for(student_id).iter().any(|s| s.id == subject_id)
    }

    pub fn subject(&self, id: &str) -> Option<&'a Subject> {
        self.subjects_by_id.get(id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(id: &str, class_id: &str, t: SubjectType) -> Subject {
        Subject {
            id: id.to_string(),
            class_id: class_id.to_string(),
            code: id.to_uppercase(),
            name: id.to_string(),
            subject_type: t,
            faculty: Vec::new(),
        }
    }

    fn student(id: &str, class_id: &str) -> Student {
        Student {
            id: id.to_string(),
            class_id: class_id.to_string(),
            batch_id: None,
            roll_no: id.to_string(),
            hall_ticket: None,
            name: id.to_string(),
            email: None,
            mobile: None,
            defaulter: false,
        }
    }

    #[test]
    fn electives_only_count_when_picked() {
        let mut roster = Roster {
            students: vec![student("s1", "c1"), student("s2", "c1"), student("s3", "c2")],
            subjects: vec![
                subject("math", "c1", SubjectType::Theory),
                subject("lab", "c1", SubjectType::Practical),
                subject("oe1", "c1", SubjectType::Oe),
                subject("oe2", "c1", SubjectType::Oe),
            ],
            ..Default::default()
        };
        roster
            .elective_picks
            .insert("s1".to_string(), vec!["oe2".to_string()]);

        let e = roster.enrolment();
        let s1: Vec<&str> = e.subjects_for("s1").iter().map(|s| s.id.as_str()).collect();
        assert_eq!(s1, vec!["math", "lab", "oe2"]);
        assert_eq!(e.subjects_for("s2").len(), 2);
        assert!(e.subjects_for("s3").is_empty());
        assert!(e.takes("s1", "oe2"));
        assert!(!e.takes("s2", "oe2"));
    }

    #[test]
    fn scoping_remembers_dropped_students() {
        let mut roster = Roster {
            students: vec![student("s1", "c1"), student("s3", "c2")],
            ..Default::default()
        };
        roster.retain_students(|s| s.class_id == "c1");
        assert_eq!(roster.students.len(), 1);
        assert!(roster.in_scope("s1"));
        assert!(!roster.in_scope("s3"));
        // Never-known ids are not "out of scope"; they stay corrupt.
        assert!(roster.in_scope("ghost"));
    }
}
