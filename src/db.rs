use crate::elective::{ElectivePick, ElectiveSelection};
use crate::model::{
    Batch, ClassInfo, Department, ElectiveCategory, FacultyAssignment, Status, Student, Subject,
    SubjectType, SubmissionRecord, SubmissionType,
};
use crate::roster::{Roster, RosterImport};
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

pub const DB_FILE: &str = "termwork.sqlite3";

pub fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("create workspace {}", workspace.display()))?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("open {}", db_path.display()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            year INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;
    // Older workspaces predate departments.
    ensure_classes_department_id(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS batches(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            roll_from TEXT,
            roll_to TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            batch_id TEXT,
            roll_no TEXT NOT NULL,
            hall_ticket TEXT,
            name TEXT NOT NULL,
            email TEXT,
            mobile TEXT,
            defaulter INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            type TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_faculty(
            subject_id TEXT NOT NULL,
            faculty_id TEXT NOT NULL,
            faculty_name TEXT NOT NULL,
            batch_id TEXT,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subject_faculty_subject ON subject_faculty(subject_id)",
        [],
    )?;

    // Confirmed values only; the optimistic overlay never reaches disk.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS submissions(
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            submission_type TEXT NOT NULL,
            status TEXT NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(student_id, subject_id, submission_type)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submissions_subject ON submissions(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS elective_selections(
            student_id TEXT NOT NULL,
            category TEXT NOT NULL,
            subject_id TEXT,
            faculty_id TEXT,
            updated_at TEXT,
            PRIMARY KEY(student_id, category)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS elective_locks(
            student_id TEXT PRIMARY KEY,
            locked_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_classes_department_id(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "classes", "department_id")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE classes ADD COLUMN department_id TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("settings {}", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportCounts {
    pub departments: usize,
    pub classes: usize,
    pub batches: usize,
    pub subjects: usize,
    pub students: usize,
}

/// Upsert reference data in one transaction; a failure leaves nothing behind.
pub fn import_roster(conn: &Connection, data: &RosterImport) -> anyhow::Result<ImportCounts> {
    let tx = conn.unchecked_transaction()?;

    for d in &data.departments {
        tx.execute(
            "INSERT INTO departments(id, name) VALUES(?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            (&d.id, &d.name),
        )
        .with_context(|| format!("department {}", d.id))?;
    }

    for c in &data.classes {
        tx.execute(
            "INSERT INTO classes(id, name, year, department_id) VALUES(?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               year = excluded.year,
               department_id = excluded.department_id",
            (&c.id, &c.name, c.year, &c.department_id),
        )
        .with_context(|| format!("class {}", c.id))?;
    }

    for b in &data.batches {
        tx.execute(
            "INSERT INTO batches(id, class_id, name, roll_from, roll_to) VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               class_id = excluded.class_id,
               name = excluded.name,
               roll_from = excluded.roll_from,
               roll_to = excluded.roll_to",
            (&b.id, &b.class_id, &b.name, &b.roll_from, &b.roll_to),
        )
        .with_context(|| format!("batch {}", b.id))?;
    }

    for s in &data.subjects {
        tx.execute(
            "INSERT INTO subjects(id, class_id, code, name, type) VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               class_id = excluded.class_id,
               code = excluded.code,
               name = excluded.name,
               type = excluded.type",
            (&s.id, &s.class_id, &s.code, &s.name, s.subject_type.as_str()),
        )
        .with_context(|| format!("subject {}", s.id))?;
        tx.execute("DELETE FROM subject_faculty WHERE subject_id = ?", [&s.id])?;
        for (i, f) in s.faculty.iter().enumerate() {
            tx.execute(
                "INSERT INTO subject_faculty(subject_id, faculty_id, faculty_name, batch_id, sort_order)
                 VALUES(?, ?, ?, ?, ?)",
                (&s.id, &f.id, &f.name, &f.batch_id, i as i64),
            )?;
        }
    }

    let ts = now_ts();
    for st in &data.students {
        tx.execute(
            "INSERT INTO students(id, class_id, batch_id, roll_no, hall_ticket, name, email, mobile, defaulter, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               class_id = excluded.class_id,
               batch_id = excluded.batch_id,
               roll_no = excluded.roll_no,
               hall_ticket = excluded.hall_ticket,
               name = excluded.name,
               email = excluded.email,
               mobile = excluded.mobile,
               defaulter = excluded.defaulter,
               updated_at = excluded.updated_at",
            rusqlite::params![
                st.id,
                st.class_id,
                st.batch_id,
                st.roll_no,
                st.hall_ticket,
                st.name,
                st.email,
                st.mobile,
                st.defaulter as i64,
                ts,
            ],
        )
        .with_context(|| format!("student {}", st.id))?;
    }

    tx.commit()?;
    Ok(ImportCounts {
        departments: data.departments.len(),
        classes: data.classes.len(),
        batches: data.batches.len(),
        subjects: data.subjects.len(),
        students: data.students.len(),
    })
}

pub fn load_roster(conn: &Connection) -> anyhow::Result<Roster> {
    let mut stmt = conn.prepare("SELECT id, name FROM departments ORDER BY name, id")?;
    let departments = stmt
        .query_map([], |r| {
            Ok(Department {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt =
        conn.prepare("SELECT id, name, year, department_id FROM classes ORDER BY year, name, id")?;
    let classes = stmt
        .query_map([], |r| {
            Ok(ClassInfo {
                id: r.get(0)?,
                name: r.get(1)?,
                year: r.get(2)?,
                department_id: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, class_id, name, roll_from, roll_to FROM batches ORDER BY class_id, name",
    )?;
    let batches = stmt
        .query_map([], |r| {
            Ok(Batch {
                id: r.get(0)?,
                class_id: r.get(1)?,
                name: r.get(2)?,
                roll_from: r.get(3)?,
                roll_to: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, class_id, batch_id, roll_no, hall_ticket, name, email, mobile, defaulter
         FROM students
         ORDER BY class_id, roll_no, name",
    )?;
    let students = stmt
        .query_map([], |r| {
            Ok(Student {
                id: r.get(0)?,
                class_id: r.get(1)?,
                batch_id: r.get(2)?,
                roll_no: r.get(3)?,
                hall_ticket: r.get(4)?,
                name: r.get(5)?,
                email: r.get(6)?,
                mobile: r.get(7)?,
                defaulter: r.get::<_, i64>(8)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut faculty: HashMap<String, Vec<FacultyAssignment>> = HashMap::new();
    let mut stmt = conn.prepare(
        "SELECT subject_id, faculty_id, faculty_name, batch_id
         FROM subject_faculty
         ORDER BY subject_id, sort_order",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(r) = rows.next()? {
        let subject_id: String = r.get(0)?;
        faculty.entry(subject_id).or_default().push(FacultyAssignment {
            id: r.get(1)?,
            name: r.get(2)?,
            batch_id: r.get(3)?,
        });
    }

    let mut subjects = Vec::new();
    let mut stmt =
        conn.prepare("SELECT id, class_id, code, name, type FROM subjects ORDER BY class_id, code")?;
    let mut rows = stmt.query([])?;
    while let Some(r) = rows.next()? {
        let id: String = r.get(0)?;
        let raw_type: String = r.get(4)?;
        let Some(subject_type) = SubjectType::parse(&raw_type) else {
            warn!(subject_id = %id, subject_type = %raw_type, "skipping subject with unknown type");
            continue;
        };
        subjects.push(Subject {
            faculty: faculty.remove(&id).unwrap_or_default(),
            id,
            class_id: r.get(1)?,
            code: r.get(2)?,
            name: r.get(3)?,
            subject_type,
        });
    }

    Ok(Roster {
        departments,
        classes,
        batches,
        students,
        subjects,
        elective_picks: load_elective_picks(conn)?,
        scoped_out: Default::default(),
    })
}

/// Confirmed records plus the number of rows that could not be read.
pub fn load_confirmed_submissions(
    conn: &Connection,
) -> anyhow::Result<(Vec<SubmissionRecord>, usize)> {
    let mut stmt = conn.prepare(
        "SELECT student_id, subject_id, submission_type, status FROM submissions",
    )?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    let mut unreadable = 0_usize;
    while let Some(r) = rows.next()? {
        let raw_type: String = r.get(2)?;
        let raw_status: String = r.get(3)?;
        let (Some(submission_type), Some(status)) =
            (SubmissionType::parse(&raw_type), Status::parse(&raw_status))
        else {
            unreadable += 1;
            continue;
        };
        out.push(SubmissionRecord {
            student_id: r.get(0)?,
            subject_id: r.get(1)?,
            submission_type,
            status,
        });
    }
    Ok((out, unreadable))
}

pub fn upsert_submission(conn: &Connection, record: &SubmissionRecord) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO submissions(student_id, subject_id, submission_type, status, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(student_id, subject_id, submission_type) DO UPDATE SET
           status = excluded.status,
           updated_at = excluded.updated_at",
        (
            &record.student_id,
            &record.subject_id,
            record.submission_type.as_str(),
            record.status.as_str(),
            now_ts(),
        ),
    )?;
    Ok(())
}

/// Merge a batch into the confirmed table. Keys absent from `records` keep
/// their stored value; an import or sync never deletes rows.
pub fn upsert_submissions(conn: &Connection, records: &[SubmissionRecord]) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    for r in records {
        upsert_submission(&tx, r)?;
    }
    tx.commit()?;
    Ok(())
}

fn load_elective_picks(conn: &Connection) -> anyhow::Result<HashMap<String, Vec<String>>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, subject_id FROM elective_selections
         WHERE subject_id IS NOT NULL
         ORDER BY student_id, category",
    )?;
    let mut rows = stmt.query([])?;
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    while let Some(r) = rows.next()? {
        let student_id: String = r.get(0)?;
        out.entry(student_id).or_default().push(r.get(1)?);
    }
    Ok(out)
}

pub fn load_elective_selection(
    conn: &Connection,
    student_id: &str,
) -> anyhow::Result<ElectiveSelection> {
    let mut sel = ElectiveSelection::new(student_id);
    let mut stmt = conn.prepare(
        "SELECT category, subject_id, faculty_id FROM elective_selections WHERE student_id = ?",
    )?;
    let mut rows = stmt.query([student_id])?;
    while let Some(r) = rows.next()? {
        let raw: String = r.get(0)?;
        let Some(category) = ElectiveCategory::parse(&raw) else {
            warn!(student_id, category = %raw, "skipping elective row with unknown category");
            continue;
        };
        sel.picks.insert(
            category,
            ElectivePick {
                subject_id: r.get(1)?,
                faculty_id: r.get(2)?,
            },
        );
    }
    sel.locked = conn
        .query_row(
            "SELECT 1 FROM elective_locks WHERE student_id = ?",
            [student_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    Ok(sel)
}

/// Persist the picks and lock flag of a selection the system of record accepted.
pub fn save_elective_selection(conn: &Connection, sel: &ElectiveSelection) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    let ts = now_ts();
    for (category, pick) in &sel.picks {
        if !pick.is_complete() {
            continue;
        }
        tx.execute(
            "INSERT INTO elective_selections(student_id, category, subject_id, faculty_id, updated_at)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(student_id, category) DO UPDATE SET
               subject_id = excluded.subject_id,
               faculty_id = excluded.faculty_id,
               updated_at = excluded.updated_at",
            (
                &sel.student_id,
                category.as_str(),
                &pick.subject_id,
                &pick.faculty_id,
                &ts,
            ),
        )?;
    }
    if sel.locked {
        tx.execute(
            "INSERT OR IGNORE INTO elective_locks(student_id, locked_at) VALUES(?, ?)",
            (&sel.student_id, &ts),
        )?;
    }
    tx.commit()?;
    Ok(())
}
