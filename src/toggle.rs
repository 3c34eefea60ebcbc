use crate::error::{CoreError, CoreResult, RemoteError};
use crate::model::{Role, SubmissionKey};
use crate::remote::{SystemOfRecord, ToggleWrite};
use crate::roster::Roster;
use crate::store::{PendingToggle, SettleOutcome, SubmissionStore};
use tracing::{debug, info, warn};

/// Check that `key` names a slot that exists for this student.
pub fn check_applicable(roster: &Roster, key: &SubmissionKey) -> CoreResult<()> {
    let student = roster
        .student(&key.student_id)
        .ok_or_else(|| CoreError::not_found("student", &key.student_id))?;
    let subject = roster
        .subject(&key.subject_id)
        .ok_or_else(|| CoreError::not_found("subject", &key.subject_id))?;
    if !roster.enrolment().takes(&student.id, &subject.id) {
        return Err(CoreError::invalid(
            None,
            "subjectId",
            format!("{} is not enrolled in {}", student.id, subject.id),
        ));
    }
    if !key
        .submission_type
        .applies_to(subject.subject_type, student.defaulter)
    {
        return Err(CoreError::NotApplicable {
            submission_type: key.submission_type,
            subject_type: subject.subject_type,
            defaulter: student.defaulter,
        });
    }
    Ok(())
}

pub fn check_role(role: Option<Role>) -> CoreResult<()> {
    match role {
        Some(r) if !r.may_mark_submissions() => Err(CoreError::Forbidden {
            role: r,
            action: "mark submissions",
        }),
        _ => Ok(()),
    }
}

/// Flips a submission optimistically and reconciles with the system of record.
pub struct ToggleController<'a> {
    store: &'a mut SubmissionStore,
}

impl<'a> ToggleController<'a> {
    pub fn new(store: &'a mut SubmissionStore) -> Self {
        Self { store }
    }

    /// First half: validate, flip locally, hand back the write to send.
    pub fn begin(
        &mut self,
        roster: &Roster,
        key: SubmissionKey,
        role: Option<Role>,
    ) -> CoreResult<PendingToggle> {
        check_role(role)?;
        check_applicable(roster, &key)?;
        let pending = self.store.begin_toggle(key);
        debug!(
            key = %pending.key,
            seq = pending.seq,
            next = pending.next.as_str(),
            "toggle applied optimistically"
        );
        Ok(pending)
    }

    /// Second half: apply the answer. A failure rolls the flip back and is
    /// returned after the rollback.
    pub fn settle(
        &mut self,
        pending: &PendingToggle,
        answer: Result<(), RemoteError>,
    ) -> CoreResult<SettleOutcome> {
        match answer {
            Ok(()) => {
                let out = self.store.settle(pending, true);
                info!(key = %pending.key, status = out.status.as_str(), "toggle confirmed");
                Ok(out)
            }
            Err(e) => {
                let out = self.store.settle(pending, false);
                warn!(
                    key = %pending.key,
                    status = out.status.as_str(),
                    error = %e,
                    "toggle rejected, rolled back"
                );
                Err(CoreError::from_remote(e))
            }
        }
    }

    /// Both halves against `remote`.
    pub fn toggle(
        &mut self,
        roster: &Roster,
        key: SubmissionKey,
        role: Option<Role>,
        remote: &dyn SystemOfRecord,
    ) -> CoreResult<SettleOutcome> {
        let pending = self.begin(roster, key, role)?;
        let answer = remote.confirm_toggle(&write_for(&pending));
        self.settle(&pending, answer)
    }
}

pub fn write_for(pending: &PendingToggle) -> ToggleWrite {
    ToggleWrite {
        student_id: pending.key.student_id.clone(),
        subject_id: pending.key.subject_id.clone(),
        submission_type: pending.key.submission_type,
        status: pending.next,
    }
}
