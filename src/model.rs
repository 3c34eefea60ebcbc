use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    Theory,
    Practical,
    Mdm,
    Oe,
    Pe,
}

impl SubjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            SubjectType::Theory => "theory",
            SubjectType::Practical => "practical",
            SubjectType::Mdm => "mdm",
            SubjectType::Oe => "oe",
            SubjectType::Pe => "pe",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "theory" => Some(SubjectType::Theory),
            "practical" => Some(SubjectType::Practical),
            "mdm" => Some(SubjectType::Mdm),
            "oe" => Some(SubjectType::Oe),
            "pe" => Some(SubjectType::Pe),
            _ => None,
        }
    }

    pub fn elective_category(self) -> Option<ElectiveCategory> {
        match self {
            SubjectType::Mdm => Some(ElectiveCategory::Mdm),
            SubjectType::Oe => Some(ElectiveCategory::Oe),
            SubjectType::Pe => Some(ElectiveCategory::Pe),
            SubjectType::Theory | SubjectType::Practical => None,
        }
    }
}

/// One axis of term work a teacher marks per student per subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionType {
    Cie,
    Ta,
    DefaulterWork,
}

impl SubmissionType {
    pub const ALL: [SubmissionType; 3] = [
        SubmissionType::Cie,
        SubmissionType::Ta,
        SubmissionType::DefaulterWork,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionType::Cie => "cie",
            SubmissionType::Ta => "ta",
            SubmissionType::DefaulterWork => "defaulter_work",
        }
    }

    /// Accepts the spellings the shell screens use ("TA", "Defaulter work", ...).
    pub fn parse(raw: &str) -> Option<Self> {
        let norm: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        match norm.as_str() {
            "cie" => Some(SubmissionType::Cie),
            "ta" => Some(SubmissionType::Ta),
            "defaulter_work" | "defaulter" => Some(SubmissionType::DefaulterWork),
            _ => None,
        }
    }

    /// Practical subjects only carry TA; defaulter work only exists for defaulters.
    pub fn applies_to(self, subject_type: SubjectType, defaulter: bool) -> bool {
        match (self, subject_type) {
            (SubmissionType::Ta, _) => true,
            (_, SubjectType::Practical) => false,
            (SubmissionType::Cie, _) => true,
            (SubmissionType::DefaulterWork, _) => defaulter,
        }
    }

    pub fn applicable(
        subject_type: SubjectType,
        defaulter: bool,
    ) -> impl Iterator<Item = SubmissionType> {
        SubmissionType::ALL
            .into_iter()
            .filter(move |t| t.applies_to(subject_type, defaulter))
    }
}

impl fmt::Display for SubmissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Pending,
    Completed,
}

impl Status {
    pub fn flip(self) -> Self {
        match self {
            Status::Pending => Status::Completed,
            Status::Completed => Status::Pending,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Status::Pending),
            "completed" | "complete" => Some(Status::Completed),
            _ => None,
        }
    }

    pub fn is_completed(self) -> bool {
        self == Status::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElectiveCategory {
    #[serde(rename = "MDM")]
    Mdm,
    #[serde(rename = "OE")]
    Oe,
    #[serde(rename = "PE")]
    Pe,
}

impl ElectiveCategory {
    pub const ALL: [ElectiveCategory; 3] =
        [ElectiveCategory::Mdm, ElectiveCategory::Oe, ElectiveCategory::Pe];

    pub fn as_str(self) -> &'static str {
        match self {
            ElectiveCategory::Mdm => "MDM",
            ElectiveCategory::Oe => "OE",
            ElectiveCategory::Pe => "PE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "MDM" => Some(ElectiveCategory::Mdm),
            "OE" => Some(ElectiveCategory::Oe),
            "PE" => Some(ElectiveCategory::Pe),
            _ => None,
        }
    }
}

impl fmt::Display for ElectiveCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    ClassTeacher,
    Faculty,
    Hod,
    Director,
    Student,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "class_teacher" | "classteacher" => Some(Role::ClassTeacher),
            "faculty" => Some(Role::Faculty),
            "hod" => Some(Role::Hod),
            "director" => Some(Role::Director),
            "student" => Some(Role::Student),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::ClassTeacher => "class_teacher",
            Role::Faculty => "faculty",
            Role::Hod => "hod",
            Role::Director => "director",
            Role::Student => "student",
        }
    }

    pub fn may_mark_submissions(self) -> bool {
        match self {
            Role::ClassTeacher | Role::Faculty => true,
            Role::Hod | Role::Director | Role::Student => false,
        }
    }

    pub fn may_edit_electives(self) -> bool {
        match self {
            Role::Student => true,
            Role::ClassTeacher | Role::Faculty | Role::Hod | Role::Director => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionKey {
    pub student_id: String,
    pub subject_id: String,
    pub submission_type: SubmissionType,
}

impl SubmissionKey {
    pub fn new(
        student_id: impl Into<String>,
        subject_id: impl Into<String>,
        submission_type: SubmissionType,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            subject_id: subject_id.into(),
            submission_type,
        }
    }
}

impl fmt::Display for SubmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.student_id, self.subject_id, self.submission_type
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub student_id: String,
    pub subject_id: String,
    pub submission_type: SubmissionType,
    pub status: Status,
}

impl SubmissionRecord {
    pub fn key(&self) -> SubmissionKey {
        SubmissionKey::new(
            self.student_id.clone(),
            self.subject_id.clone(),
            self.submission_type,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub class_id: String,
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub roll_no: String,
    #[serde(default)]
    pub hall_ticket: Option<String>,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub defaulter: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultyAssignment {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Practical subjects assign faculty per batch.
    #[serde(default)]
    pub batch_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub class_id: String,
    #[serde(default)]
    pub code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub subject_type: SubjectType,
    #[serde(default)]
    pub faculty: Vec<FacultyAssignment>,
}

impl Subject {
    pub fn offers_faculty(&self, faculty_id: &str) -> bool {
        self.faculty.iter().any(|f| f.id == faculty_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub id: String,
    pub name: String,
    pub year: i64,
    #[serde(default)]
    pub department_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: String,
    pub class_id: String,
    pub name: String,
    #[serde(default)]
    pub roll_from: Option<String>,
    #[serde(default)]
    pub roll_to: Option<String>,
}
