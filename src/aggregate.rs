use crate::model::{Status, SubjectType, SubmissionKey, SubmissionRecord, SubmissionType};
use crate::roster::Roster;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Same rounding the dashboards have always shown: `Int(x + 0.5)`.
pub fn round_percent(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// `round(100 * num / denom)`, with an empty denominator defined as 0.
pub fn percent(num: usize, denom: usize) -> i64 {
    if denom == 0 {
        return 0;
    }
    round_percent(100.0 * (num as f64) / (denom as f64))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    Regular,
    Defaulter,
    Completed,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Regular, Category::Defaulter, Category::Completed];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "regular" => Some(Category::Regular),
            "defaulter" => Some(Category::Defaulter),
            "completed" => Some(Category::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotCount {
    pub applicable: usize,
    pub completed: usize,
}

impl SlotCount {
    fn add(&mut self, completed: bool) {
        self.applicable += 1;
        if completed {
            self.completed += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCounts {
    pub cie: SlotCount,
    pub ta: SlotCount,
    pub defaulter_work: SlotCount,
}

impl TypeCounts {
    fn slot_mut(&mut self, t: SubmissionType) -> &mut SlotCount {
        match t {
            SubmissionType::Cie => &mut self.cie,
            SubmissionType::Ta => &mut self.ta,
            SubmissionType::DefaulterWork => &mut self.defaulter_work,
        }
    }

    pub fn get(&self, t: SubmissionType) -> SlotCount {
        match t {
            SubmissionType::Cie => self.cie,
            SubmissionType::Ta => self.ta,
            SubmissionType::DefaulterWork => self.defaulter_work,
        }
    }

    pub fn total(&self) -> SlotCount {
        SlotCount {
            applicable: self.cie.applicable + self.ta.applicable + self.defaulter_work.applicable,
            completed: self.cie.completed + self.ta.completed + self.defaulter_work.completed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeStatus {
    pub submission_type: SubmissionType,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectProgress {
    pub subject_id: String,
    pub code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub subject_type: SubjectType,
    pub submissions: Vec<TypeStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub student_id: String,
    pub name: String,
    pub roll_no: String,
    pub class_id: String,
    pub batch_id: Option<String>,
    pub defaulter: bool,
    pub submission_percentage: i64,
    pub applicable_count: usize,
    pub completed_count: usize,
    pub categories: Vec<Category>,
    pub by_type: TypeCounts,
    pub subjects: Vec<SubjectProgress>,
}

impl StudentSummary {
    /// The three tags are evaluated independently.
    pub fn is_in(&self, category: Category) -> bool {
        match category {
            Category::Regular => self.submission_percentage < 100,
            Category::Completed => self.submission_percentage == 100,
            Category::Defaulter => self.defaulter,
        }
    }

    pub fn takes(&self, subject_id: &str) -> bool {
        self.subjects.iter().any(|s| s.subject_id == subject_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub students: Vec<StudentSummary>,
    /// Records that referenced unknown students/subjects or inapplicable
    /// slots; they are left out rather than failing the whole computation.
    pub skipped_records: usize,
}

impl Aggregate {
    pub fn student(&self, id: &str) -> Option<&StudentSummary> {
        self.students.iter().find(|s| s.student_id == id)
    }
}

pub fn aggregate<I>(roster: &Roster, records: I) -> Aggregate
where
    I: IntoIterator<Item = SubmissionRecord>,
{
    let enrolment = roster.enrolment();
    let defaulter_by_id: HashMap<&str, bool> = roster
        .students
        .iter()
        .map(|s| (s.id.as_str(), s.defaulter))
        .collect();

    let mut completed: HashSet<SubmissionKey> = HashSet::new();
    let mut skipped_records = 0_usize;
    for r in records {
        let Some(defaulter) = defaulter_by_id.get(r.student_id.as_str()).copied() else {
            skipped_records += 1;
            continue;
        };
        let Some(subject) = enrolment.subject(&r.subject_id) else {
            skipped_records += 1;
            continue;
        };
        if !enrolment.takes(&r.student_id, &r.subject_id)
            || !r.submission_type.applies_to(subject.subject_type, defaulter)
        {
            skipped_records += 1;
            continue;
        }
        if r.status.is_completed() {
            completed.insert(r.key());
        }
    }

    let mut students = Vec::with_capacity(roster.students.len());
    for st in &roster.students {
        let mut by_type = TypeCounts::default();
        let mut subjects = Vec::new();
        for subject in enrolment.subjects_for(&st.id) {
            let mut statuses = Vec::new();
            for t in SubmissionType::applicable(subject.subject_type, st.defaulter) {
                let key = SubmissionKey::new(st.id.clone(), subject.id.clone(), t);
                let done = completed.contains(&key);
                by_type.slot_mut(t).add(done);
                statuses.push(TypeStatus {
                    submission_type: t,
                    status: if done { Status::Completed } else { Status::Pending },
                });
            }
            subjects.push(SubjectProgress {
                subject_id: subject.id.clone(),
                code: subject.code.clone(),
                name: subject.name.clone(),
                subject_type: subject.subject_type,
                submissions: statuses,
            });
        }

        let total = by_type.total();
        let mut summary = StudentSummary {
            student_id: st.id.clone(),
            name: st.name.clone(),
            roll_no: st.roll_no.clone(),
            class_id: st.class_id.clone(),
            batch_id: st.batch_id.clone(),
            defaulter: st.defaulter,
            submission_percentage: percent(total.completed, total.applicable),
            applicable_count: total.applicable,
            completed_count: total.completed,
            categories: Vec::new(),
            by_type,
            subjects,
        };
        summary.categories = Category::ALL
            .into_iter()
            .filter(|c| summary.is_in(*c))
            .collect();
        students.push(summary);
    }

    Aggregate {
        students,
        skipped_records,
    }
}

/// Arithmetic mean of per-student percentages, rounded; 0 for an empty group.
pub fn mean_percentage<'a, I>(students: I) -> i64
where
    I: IntoIterator<Item = &'a StudentSummary>,
{
    let mut sum = 0_i64;
    let mut n = 0_i64;
    for s in students {
        sum += s.submission_percentage;
        n += 1;
    }
    if n == 0 {
        return 0;
    }
    round_percent(sum as f64 / n as f64)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStatistics {
    pub overall_submission: i64,
    pub submission_marked: i64,
    pub defaulter_work_submitted: i64,
    pub total_students: usize,
    pub completed_students: usize,
    pub defaulter_students: usize,
}

pub fn dashboard_statistics<'a, I>(students: I) -> DashboardStatistics
where
    I: IntoIterator<Item = &'a StudentSummary>,
{
    let students: Vec<&StudentSummary> = students.into_iter().collect();
    let mut marked = SlotCount::default();
    let mut defaulter_work = SlotCount::default();
    for s in &students {
        for t in [SubmissionType::Cie, SubmissionType::Ta] {
            let c = s.by_type.get(t);
            marked.applicable += c.applicable;
            marked.completed += c.completed;
        }
        defaulter_work.applicable += s.by_type.defaulter_work.applicable;
        defaulter_work.completed += s.by_type.defaulter_work.completed;
    }

    DashboardStatistics {
        overall_submission: mean_percentage(students.iter().copied()),
        submission_marked: percent(marked.completed, marked.applicable),
        defaulter_work_submitted: percent(defaulter_work.completed, defaulter_work.applicable),
        total_students: students.len(),
        completed_students: students
            .iter()
            .filter(|s| s.is_in(Category::Completed))
            .count(),
        defaulter_students: students.iter().filter(|s| s.defaulter).count(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStatistics {
    pub id: String,
    pub name: String,
    pub percentage: i64,
    pub total_students: usize,
    pub completed_students: usize,
    pub defaulter_students: usize,
    pub class_count: usize,
}

fn group_statistics(
    id: String,
    name: String,
    class_ids: &HashSet<&str>,
    agg: &Aggregate,
) -> GroupStatistics {
    let members: Vec<&StudentSummary> = agg
        .students
        .iter()
        .filter(|s| class_ids.contains(s.class_id.as_str()))
        .collect();
    GroupStatistics {
        id,
        name,
        percentage: mean_percentage(members.iter().copied()),
        total_students: members.len(),
        completed_students: members
            .iter()
            .filter(|s| s.is_in(Category::Completed))
            .count(),
        defaulter_students: members.iter().filter(|s| s.defaulter).count(),
        class_count: class_ids.len(),
    }
}

pub fn class_statistics(roster: &Roster, agg: &Aggregate) -> Vec<GroupStatistics> {
    roster
        .classes
        .iter()
        .map(|c| {
            let ids: HashSet<&str> = [c.id.as_str()].into_iter().collect();
            group_statistics(c.id.clone(), c.name.clone(), &ids, agg)
        })
        .collect()
}

pub fn year_name(year: i64) -> String {
    match year {
        1 => "First Year".to_string(),
        2 => "Second Year".to_string(),
        3 => "Third Year".to_string(),
        4 => "Fourth Year".to_string(),
        n => format!("Year {}", n),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearStatistics {
    pub year: i64,
    pub year_name: String,
    #[serde(flatten)]
    pub stats: GroupStatistics,
}

/// Per academic year, optionally restricted to one department (HOD view).
pub fn year_statistics(
    roster: &Roster,
    agg: &Aggregate,
    department_id: Option<&str>,
) -> Vec<YearStatistics> {
    let mut years: BTreeMap<i64, HashSet<&str>> = BTreeMap::new();
    for c in &roster.classes {
        if department_id.is_some() && c.department_id.as_deref() != department_id {
            continue;
        }
        years.entry(c.year).or_default().insert(c.id.as_str());
    }
    years
        .into_iter()
        .map(|(year, class_ids)| YearStatistics {
            year,
            year_name: year_name(year),
            stats: group_statistics(year.to_string(), year_name(year), &class_ids, agg),
        })
        .collect()
}

/// Per department (Director view). Departments without classes report 0.
pub fn department_statistics(roster: &Roster, agg: &Aggregate) -> Vec<GroupStatistics> {
    roster
        .departments
        .iter()
        .map(|d| {
            let class_ids: HashSet<&str> = roster
                .classes
                .iter()
                .filter(|c| c.department_id.as_deref() == Some(d.id.as_str()))
                .map(|c| c.id.as_str())
                .collect();
            group_statistics(d.id.clone(), d.name.clone(), &class_ids, agg)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeTally {
    pub submission_type: SubmissionType,
    pub total: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStatistics {
    pub subject_id: String,
    pub code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub subject_type: SubjectType,
    pub student_count: usize,
    pub defaulter_count: usize,
    pub submission_stats: Vec<TypeTally>,
    pub completion_percentage: i64,
}

/// Subject-wise analysis, optionally only for subjects a faculty member teaches.
pub fn subject_statistics(
    roster: &Roster,
    agg: &Aggregate,
    faculty_id: Option<&str>,
) -> Vec<SubjectStatistics> {
    let mut out = Vec::new();
    for subject in &roster.subjects {
        if let Some(fid) = faculty_id {
            if !subject.offers_faculty(fid) {
                continue;
            }
        }

        let mut tallies: BTreeMap<SubmissionType, (usize, usize)> = BTreeMap::new();
        let mut student_count = 0_usize;
        let mut defaulter_count = 0_usize;
        for st in &agg.students {
            let Some(progress) = st.subjects.iter().find(|p| p.subject_id == subject.id) else {
                continue;
            };
            student_count += 1;
            if st.defaulter {
                defaulter_count += 1;
            }
            for ts in &progress.submissions {
                let entry = tallies.entry(ts.submission_type).or_insert((0, 0));
                entry.0 += 1;
                if ts.status.is_completed() {
                    entry.1 += 1;
                }
            }
        }

        let total: usize = tallies.values().map(|(t, _)| *t).sum();
        let completed: usize = tallies.values().map(|(_, c)| *c).sum();
        out.push(SubjectStatistics {
            subject_id: subject.id.clone(),
            code: subject.code.clone(),
            name: subject.name.clone(),
            subject_type: subject.subject_type,
            student_count,
            defaulter_count,
            submission_stats: tallies
                .into_iter()
                .map(|(submission_type, (total, completed))| TypeTally {
                    submission_type,
                    total,
                    completed,
                })
                .collect(),
            completion_percentage: percent(completed, total),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassInfo, Department, Student, Subject};

    fn student(id: &str, class_id: &str, defaulter: bool) -> Student {
        Student {
            id: id.to_string(),
            class_id: class_id.to_string(),
            batch_id: None,
            roll_no: format!("R-{}", id),
            hall_ticket: None,
            name: format!("Student {}", id),
            email: None,
            mobile: None,
            defaulter,
        }
    }

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

    fn rec(student: &str, subject: &str, t: SubmissionType, status: Status) -> SubmissionRecord {
        SubmissionRecord {
            student_id: student.to_string(),
            subject_id: subject.to_string(),
            submission_type: t,
            status,
        }
    }

    fn summary_with(pct: i64, class_id: &str) -> StudentSummary {
        StudentSummary {
            student_id: format!("s{}", pct),
            name: String::new(),
            roll_no: String::new(),
            class_id: class_id.to_string(),
            batch_id: None,
            defaulter: false,
            submission_percentage: pct,
            applicable_count: 0,
            completed_count: 0,
            categories: Vec::new(),
            by_type: TypeCounts::default(),
            subjects: Vec::new(),
        }
    }

    #[test]
    fn practical_only_student_with_ta_done_is_complete() {
        let roster = Roster {
            students: vec![student("s1", "c1", false)],
            subjects: vec![subject("lab", "c1", SubjectType::Practical)],
            ..Default::default()
        };
        let agg = aggregate(
            &roster,
            vec![rec("s1", "lab", SubmissionType::Ta, Status::Completed)],
        );
        let s = &agg.students[0];
        assert_eq!(s.applicable_count, 1);
        assert_eq!(s.submission_percentage, 100);
        assert!(s.is_in(Category::Completed));
        assert!(!s.is_in(Category::Regular));
    }

    #[test]
    fn zero_applicable_is_zero_percent() {
        let roster = Roster {
            students: vec![student("s1", "c1", false)],
            ..Default::default()
        };
        let agg = aggregate(&roster, Vec::new());
        assert_eq!(agg.students[0].applicable_count, 0);
        assert_eq!(agg.students[0].submission_percentage, 0);
        assert_eq!(agg.students[0].categories, vec![Category::Regular]);
    }

    #[test]
    fn defaulter_work_counts_only_for_defaulters() {
        let roster = Roster {
            students: vec![student("d1", "c1", true), student("r1", "c1", false)],
            subjects: vec![subject("math", "c1", SubjectType::Theory)],
            ..Default::default()
        };
        let agg = aggregate(
            &roster,
            vec![
                rec("d1", "math", SubmissionType::Cie, Status::Completed),
                rec("d1", "math", SubmissionType::Ta, Status::Completed),
                rec("r1", "math", SubmissionType::Cie, Status::Completed),
                rec("r1", "math", SubmissionType::Ta, Status::Completed),
                // Not applicable to a non-defaulter: ignored.
                rec("r1", "math", SubmissionType::DefaulterWork, Status::Completed),
            ],
        );
        let d1 = agg.student("d1").expect("d1");
        assert_eq!(d1.applicable_count, 3);
        assert_eq!(d1.submission_percentage, 67);
        assert_eq!(d1.categories, vec![Category::Regular, Category::Defaulter]);

        let r1 = agg.student("r1").expect("r1");
        assert_eq!(r1.submission_percentage, 100);
        assert_eq!(agg.skipped_records, 1);
    }

    #[test]
    fn corrupt_records_are_skipped_not_fatal() {
        let roster = Roster {
            students: vec![student("s1", "c1", false)],
            subjects: vec![subject("math", "c1", SubjectType::Theory)],
            ..Default::default()
        };
        let agg = aggregate(
            &roster,
            vec![
                rec("ghost", "math", SubmissionType::Ta, Status::Completed),
                rec("s1", "nope", SubmissionType::Ta, Status::Completed),
                rec("s1", "math", SubmissionType::Ta, Status::Completed),
            ],
        );
        assert_eq!(agg.skipped_records, 2);
        assert_eq!(agg.students[0].submission_percentage, 50);
    }

    #[test]
    fn percentage_is_100_iff_every_applicable_slot_completed() {
        let roster = Roster {
            students: vec![student("s1", "c1", true)],
            subjects: vec![
                subject("math", "c1", SubjectType::Theory),
                subject("lab", "c1", SubjectType::Practical),
            ],
            ..Default::default()
        };
        let mut records = vec![
            rec("s1", "math", SubmissionType::Cie, Status::Completed),
            rec("s1", "math", SubmissionType::Ta, Status::Completed),
            rec("s1", "lab", SubmissionType::Ta, Status::Completed),
        ];
        let agg = aggregate(&roster, records.clone());
        assert_eq!(agg.students[0].submission_percentage, 75);

        records.push(rec("s1", "math", SubmissionType::DefaulterWork, Status::Completed));
        let agg = aggregate(&roster, records);
        assert_eq!(agg.students[0].submission_percentage, 100);
        assert!(agg.students[0].submission_percentage <= 100);
    }

    #[test]
    fn department_average_rounds_mean() {
        let roster = Roster {
            departments: vec![Department {
                id: "d1".into(),
                name: "Computer".into(),
            }],
            classes: vec![ClassInfo {
                id: "c1".into(),
                name: "SE-A".into(),
                year: 2,
                department_id: Some("d1".into()),
            }],
            ..Default::default()
        };
        let agg = Aggregate {
            students: vec![
                summary_with(60, "c1"),
                summary_with(80, "c1"),
                summary_with(100, "c1"),
            ],
            skipped_records: 0,
        };
        let depts = department_statistics(&roster, &agg);
        assert_eq!(depts.len(), 1);
        assert_eq!(depts[0].percentage, 80);
        assert_eq!(depts[0].total_students, 3);
        assert_eq!(depts[0].completed_students, 1);

        let years = year_statistics(&roster, &agg, Some("d1"));
        assert_eq!(years[0].year_name, "Second Year");
        assert_eq!(years[0].stats.percentage, 80);
    }

    #[test]
    fn empty_groups_report_zero() {
        let roster = Roster {
            departments: vec![Department {
                id: "d9".into(),
                name: "Empty".into(),
            }],
            ..Default::default()
        };
        let agg = aggregate(&roster, Vec::new());
        let depts = department_statistics(&roster, &agg);
        assert_eq!(depts[0].percentage, 0);
        assert_eq!(depts[0].class_count, 0);
        assert_eq!(mean_percentage(std::iter::empty::<&StudentSummary>()), 0);
        assert_eq!(
            dashboard_statistics(std::iter::empty::<&StudentSummary>()),
            DashboardStatistics::default()
        );
    }

    #[test]
    fn dashboard_splits_marked_and_defaulter_work() {
        let roster = Roster {
            students: vec![student("d1", "c1", true), student("r1", "c1", false)],
            subjects: vec![subject("math", "c1", SubjectType::Theory)],
            ..Default::default()
        };
        let agg = aggregate(
            &roster,
            vec![
                rec("d1", "math", SubmissionType::DefaulterWork, Status::Completed),
                rec("r1", "math", SubmissionType::Cie, Status::Completed),
            ],
        );
        let stats = dashboard_statistics(&agg.students);
        // d1: 1/3 -> 33, r1: 1/2 -> 50
        assert_eq!(stats.overall_submission, 42);
        assert_eq!(stats.submission_marked, 25);
        assert_eq!(stats.defaulter_work_submitted, 100);
        assert_eq!(stats.defaulter_students, 1);
    }

    #[test]
    fn subject_statistics_tally_per_type() {
        let mut lab = subject("lab", "c1", SubjectType::Practical);
        lab.faculty.push(crate::model::FacultyAssignment {
            id: "f1".into(),
            name: "Prof".into(),
            batch_id: None,
        });
        let roster = Roster {
            students: vec![student("s1", "c1", false), student("s2", "c1", true)],
            subjects: vec![lab, subject("math", "c1", SubjectType::Theory)],
            ..Default::default()
        };
        let agg = aggregate(
            &roster,
            vec![rec("s1", "lab", SubmissionType::Ta, Status::Completed)],
        );
        let stats = subject_statistics(&roster, &agg, Some("f1"));
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].student_count, 2);
        assert_eq!(stats[0].defaulter_count, 1);
        assert_eq!(
            stats[0].submission_stats,
            vec![TypeTally {
                submission_type: SubmissionType::Ta,
                total: 2,
                completed: 1
            }]
        );
        assert_eq!(stats[0].completion_percentage, 50);
    }
}
