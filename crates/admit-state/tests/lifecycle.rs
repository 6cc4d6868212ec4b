//! # Application Lifecycle Tests
//!
//! End-to-end behaviour of the aggregate against a small catalog, plus
//! property tests for the completeness gate and the transition engine.

use admit_core::{Actor, ApplicationId, DocumentId, Timestamp, UserId};
use admit_state::{
    is_complete, AllowedFormats, Application, ApplicationError, ApplicationForm,
    ApplicationStatus, Catalog, DepartmentDraft, Document, DocumentRequirement, DocumentSet,
    FormNumber, ProgramDraft, ProgramStatus, ProgramType, RequirementDraft, Amount,
};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn form() -> ApplicationForm {
    ApplicationForm {
        date_of_birth: Some("2005-09-30".to_string()),
        gender: Some("other".to_string()),
        permanent_address: Some("7 Lake View, Bhopal".to_string()),
        emergency_contact_name: Some("R. Verma".to_string()),
        emergency_contact_phone: Some("9000000001".to_string()),
        emergency_contact_relation: Some("Sibling".to_string()),
        tenth_percentage: Some(FormNumber::Number(78.0)),
        tenth_board: Some("MPBSE".to_string()),
        tenth_year: Some(FormNumber::Number(2021.0)),
        ..Default::default()
    }
}

fn catalog_with_requirements(reqs: &[(&str, bool)]) -> (Catalog, admit_core::ProgramId) {
    let mut catalog = Catalog::new();
    let department = catalog
        .add_department(
            DepartmentDraft {
                name: "Science".to_string(),
                code: "SCI".to_string(),
                ..Default::default()
            },
            Timestamp::now(),
        )
        .unwrap()
        .id;
    let program = catalog
        .add_program(
            ProgramDraft {
                name: "B.Sc Physics".to_string(),
                code: "BSCP".to_string(),
                department_id: department,
                program_type: ProgramType::Undergraduate,
                duration_years: 3,
                duration_semesters: 6,
                description: "Physics honours".to_string(),
                intake_capacity: 40,
                fees_per_semester: Amount::parse("30000").unwrap(),
                application_fee: Amount::parse("500").unwrap(),
                min_percentage: 55.0,
                eligibility_criteria: "12th with PCM".to_string(),
                application_start_date: Timestamp::parse("2026-01-01T00:00:00Z").unwrap(),
                application_end_date: Timestamp::parse("2026-12-31T00:00:00Z").unwrap(),
                status: ProgramStatus::Active,
            },
            Timestamp::now(),
        )
        .unwrap()
        .id;
    for (name, mandatory) in reqs {
        catalog
            .add_requirement(
                program,
                RequirementDraft {
                    document_name: name.to_string(),
                    description: String::new(),
                    is_mandatory: *mandatory,
                    max_file_size_mb: 5,
                    allowed_formats: AllowedFormats::default(),
                },
            )
            .unwrap();
    }
    (catalog, program)
}

fn stored(app: &Application, req: &DocumentRequirement, filename: &str) -> Document {
    Document {
        id: DocumentId::new(),
        application_id: app.id,
        requirement_id: req.id,
        stored_path: format!("applications/{}/{}/{}", app.applicant_id, app.id, filename),
        original_filename: filename.to_string(),
        file_size: 4096,
        sha256: "cd".repeat(32),
        uploaded_at: Timestamp::now(),
        verified: false,
        verification_notes: String::new(),
        verified_by: None,
        verified_at: None,
    }
}

fn requirement_named<'a>(reqs: &[&'a DocumentRequirement], name: &str) -> &'a DocumentRequirement {
    reqs.iter()
        .copied()
        .find(|r| r.document_name == name)
        .unwrap()
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

#[test]
fn marksheet_photo_resume_scenario() {
    let (catalog, program) = catalog_with_requirements(&[
        ("10th Marksheet", true),
        ("Photo", true),
        ("Resume", false),
    ]);
    let reqs = catalog.requirements_for(&program);
    let applicant = Actor::applicant(UserId::new());
    let officer = Actor::officer(UserId::new());

    let mut app = Application::new(
        ApplicationId::new(),
        &applicant,
        program,
        form().validate().unwrap(),
        reqs.iter().copied(),
        Timestamp::now(),
    )
    .unwrap();
    assert!(!app.is_complete);

    let marksheet = requirement_named(&reqs, "10th Marksheet");
    let doc = stored(&app, marksheet, "marks.pdf");
    app.attach_document(&applicant, marksheet, doc, reqs.iter().copied(), Timestamp::now())
        .unwrap();
    assert!(!app.is_complete);

    let photo = requirement_named(&reqs, "Photo");
    let doc = stored(&app, photo, "me.jpg");
    app.attach_document(&applicant, photo, doc, reqs.iter().copied(), Timestamp::now())
        .unwrap();
    assert!(app.is_complete);

    app.submit(&applicant, reqs.iter().copied(), Timestamp::now())
        .unwrap();
    assert_eq!(app.status, ApplicationStatus::Submitted);
    assert!(app.submitted_at.is_some());

    app.change_status(
        &officer,
        ApplicationStatus::UnderReview,
        "initial screen",
        Timestamp::now(),
    )
    .unwrap();

    let transitions: Vec<_> = app
        .history
        .iter()
        .map(|h| (h.previous_status, h.new_status))
        .collect();
    assert_eq!(
        transitions,
        [
            (ApplicationStatus::Draft, ApplicationStatus::Submitted),
            (ApplicationStatus::Submitted, ApplicationStatus::UnderReview),
        ]
    );
    assert_eq!(app.history[1].change_reason, "initial screen");
}

#[test]
fn retiring_a_mandatory_requirement_unblocks_submission() {
    let (mut catalog, program) =
        catalog_with_requirements(&[("Photo", true), ("Transfer Certificate", true)]);
    let applicant = Actor::applicant(UserId::new());
    let reqs = catalog.requirements_for(&program);
    let photo = requirement_named(&reqs, "Photo").clone();
    let tc = requirement_named(&reqs, "Transfer Certificate").id;

    let mut app = Application::new(
        ApplicationId::new(),
        &applicant,
        program,
        form().validate().unwrap(),
        reqs.iter().copied(),
        Timestamp::now(),
    )
    .unwrap();
    let doc = stored(&app, &photo, "me.png");
    app.attach_document(&applicant, &photo, doc, reqs.iter().copied(), Timestamp::now())
        .unwrap();
    assert!(!app.is_complete);

    catalog.retire_requirement(tc, Timestamp::now()).unwrap();
    let reqs = catalog.requirements_for(&program);
    assert!(app.recompute_completeness(reqs.iter().copied()));
    app.submit(&applicant, reqs.iter().copied(), Timestamp::now())
        .unwrap();
}

#[test]
fn upload_for_retired_requirement_is_refused() {
    let (mut catalog, program) = catalog_with_requirements(&[("Photo", true)]);
    let applicant = Actor::applicant(UserId::new());
    let photo = catalog.requirements_for(&program)[0].clone();
    let app = Application::new(
        ApplicationId::new(),
        &applicant,
        program,
        form().validate().unwrap(),
        std::iter::once(&photo),
        Timestamp::now(),
    )
    .unwrap();
    let retired = catalog
        .retire_requirement(photo.id, Timestamp::now())
        .unwrap()
        .clone();
    assert!(matches!(
        app.check_upload(&applicant, &retired, "me.png", 10),
        Err(ApplicationError::Document(_))
    ));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

fn requirement(mandatory: bool, retired: bool) -> DocumentRequirement {
    DocumentRequirement {
        id: admit_core::RequirementId::new(),
        program_id: admit_core::ProgramId::new(),
        document_name: "req".to_string(),
        description: String::new(),
        is_mandatory: mandatory,
        max_file_size_mb: 5,
        allowed_formats: AllowedFormats::default(),
        retired_at: retired.then(Timestamp::now),
    }
}

fn upload_all<'a>(reqs: impl IntoIterator<Item = &'a DocumentRequirement>) -> DocumentSet {
    reqs.into_iter()
        .map(|r| Document {
            id: DocumentId::new(),
            application_id: ApplicationId::new(),
            requirement_id: r.id,
            stored_path: String::new(),
            original_filename: "f.pdf".to_string(),
            file_size: 1,
            sha256: String::new(),
            uploaded_at: Timestamp::now(),
            verified: false,
            verification_notes: String::new(),
            verified_by: None,
            verified_at: None,
        })
        .collect()
}

fn any_status() -> impl Strategy<Value = ApplicationStatus> {
    prop::sample::select(ApplicationStatus::ALL.to_vec())
}

fn any_actor_kind() -> impl Strategy<Value = u8> {
    0u8..3
}

proptest! {
    /// Completeness holds exactly when every active mandatory requirement
    /// has an upload, whatever else is uploaded.
    #[test]
    fn completeness_matches_definition(
        layout in prop::collection::vec((any::<bool>(), any::<bool>(), any::<bool>()), 0..12)
    ) {
        let reqs: Vec<_> = layout
            .iter()
            .map(|(mandatory, retired, _)| requirement(*mandatory, *retired))
            .collect();
        let docs = upload_all(
            reqs.iter().zip(&layout).filter(|(_, (_, _, uploaded))| *uploaded).map(|(r, _)| r),
        );
        let expected = reqs
            .iter()
            .zip(&layout)
            .all(|(r, (_, _, uploaded))| !r.is_mandatory || !r.is_active() || *uploaded);
        prop_assert_eq!(is_complete(&reqs, &docs), expected);
    }

    /// Uploading everything always completes an application.
    #[test]
    fn full_upload_is_complete(flags in prop::collection::vec(any::<bool>(), 0..12)) {
        let reqs: Vec<_> = flags.iter().map(|m| requirement(*m, false)).collect();
        prop_assert!(is_complete(&reqs, &upload_all(&reqs)));
    }

    /// The transition table never leaves a terminal state, never allows a
    /// self-transition and never lets an applicant take a review decision.
    #[test]
    fn transition_table_invariants(from in any_status(), to in any_status()) {
        for role in [admit_core::Role::Applicant, admit_core::Role::AdmissionOfficer, admit_core::Role::Admin] {
            let allowed = from.permits(to, role);
            if from.is_terminal() || from == to {
                prop_assert!(!allowed);
            }
            if role == admit_core::Role::Applicant && allowed {
                prop_assert!(to == ApplicationStatus::Submitted || to == ApplicationStatus::Withdrawn);
            }
            if to == ApplicationStatus::UnderReview && allowed {
                prop_assert_eq!(from, ApplicationStatus::Submitted);
            }
        }
    }

    /// Random sequences of status requests: history grows by exactly one
    /// entry per accepted request, rejected requests change nothing, and
    /// applicants never get a staff transition through.
    #[test]
    fn history_is_append_only(
        steps in prop::collection::vec((any_actor_kind(), any_status()), 0..24)
    ) {
        let (catalog, program) = catalog_with_requirements(&[]);
        let reqs = catalog.requirements_for(&program);
        let owner = Actor::applicant(UserId::new());
        let officer = Actor::officer(UserId::new());
        let admin = Actor::admin(UserId::new());
        let mut app = Application::new(
            ApplicationId::new(),
            &owner,
            program,
            form().validate().unwrap(),
            reqs.iter().copied(),
            Timestamp::now(),
        )
        .unwrap();
        app.submit(&owner, reqs.iter().copied(), Timestamp::now()).unwrap();

        let mut accepted = 1usize;
        for (kind, to) in steps {
            let actor = match kind {
                0 => owner,
                1 => officer,
                _ => admin,
            };
            let before = app.clone();
            let result = app.change_status(&actor, to, "step", Timestamp::now());
            match result {
                Ok(()) => {
                    accepted += 1;
                    prop_assert!(actor.is_staff());
                    prop_assert_eq!(app.status, to);
                    prop_assert_eq!(&app.history[..before.history.len()], &before.history[..]);
                }
                Err(err) => {
                    if !actor.is_staff() {
                        let is_role_error = matches!(err, ApplicationError::RoleNotPermitted { .. });
                        prop_assert!(is_role_error);
                    }
                    prop_assert_eq!(&app, &before);
                }
            }
            prop_assert_eq!(app.history.len(), accepted);
        }
        let statuses: Vec<_> = app.history.iter().map(|h| h.new_status).collect();
        for pair in app.history.windows(2) {
            prop_assert_eq!(pair[0].new_status, pair[1].previous_status);
        }
        prop_assert_eq!(statuses.last().copied(), Some(app.status));
    }
}
