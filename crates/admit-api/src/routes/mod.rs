//! # Route Modules
//!
//! Each module defines an Axum Router for one API surface area.
//! Routers are assembled in `lib.rs` into the application.

pub mod applications;
pub mod documents;
pub mod events;
pub mod programs;

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared fixture for route tests: a state with one open program that
    //! requires a marksheet and a photo, and a helper that drives the API
    //! routers as a given caller.

    use admit_core::Timestamp;
    use admit_state::{
        AllowedFormats, Amount, DepartmentDraft, ProgramDraft, ProgramStatus, ProgramType,
        RequirementDraft,
    };
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::{Extension, Router};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::auth::CallerIdentity;
    use crate::state::{AppConfig, AppState};

    pub(crate) struct Fixture {
        pub state: AppState,
        pub program_id: String,
        pub marksheet_id: String,
        pub photo_id: String,
        _dir: tempfile::TempDir,
    }

    pub(crate) fn program_draft(
        department_id: admit_core::DepartmentId,
        code: &str,
    ) -> ProgramDraft {
        let now = chrono::Utc::now();
        ProgramDraft {
            name: "B.Tech Computer Science".into(),
            code: code.into(),
            department_id,
            program_type: ProgramType::Undergraduate,
            duration_years: 4,
            duration_semesters: 8,
            description: "Four year programme".into(),
            intake_capacity: 60,
            fees_per_semester: Amount::parse("85000").unwrap(),
            application_fee: Amount::parse("500").unwrap(),
            min_percentage: 60.0,
            eligibility_criteria: "12th with PCM".into(),
            application_start_date: Timestamp::from_utc(now - chrono::Duration::days(1)),
            application_end_date: Timestamp::from_utc(now + chrono::Duration::days(30)),
            status: ProgramStatus::Active,
        }
    }

    fn requirement(name: &str, mandatory: bool) -> RequirementDraft {
        RequirementDraft {
            document_name: name.into(),
            description: String::new(),
            is_mandatory: mandatory,
            max_file_size_mb: 1,
            allowed_formats: AllowedFormats::default(),
        }
    }

    impl Fixture {
        pub(crate) async fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = AppConfig {
                upload_dir: dir.path().to_path_buf(),
                ..AppConfig::default()
            };
            let state = AppState::with_config(config, None);
            let lifecycle = &state.lifecycle;
            let department = lifecycle
                .create_department(DepartmentDraft {
                    name: "Engineering".into(),
                    code: "ENG".into(),
                    ..Default::default()
                })
                .await
                .unwrap();
            let program = lifecycle
                .create_program(program_draft(department.id, "BTCS"))
                .await
                .unwrap();
            let marksheet = lifecycle
                .add_requirement(program.id, requirement("10th Marksheet", true))
                .await
                .unwrap();
            let photo = lifecycle
                .add_requirement(program.id, requirement("Photo", true))
                .await
                .unwrap();
            lifecycle
                .add_requirement(program.id, requirement("Resume", false))
                .await
                .unwrap();
            Self {
                state,
                program_id: program.id.to_string(),
                marksheet_id: marksheet.id.to_string(),
                photo_id: photo.id.to_string(),
                _dir: dir,
            }
        }

        pub(crate) fn create_body(&self) -> serde_json::Value {
            serde_json::json!({
                "program_id": self.program_id,
                "date_of_birth": "2006-04-12",
                "gender": "female",
                "permanent_address": "12 Lake Road, Pune",
                "emergency_contact_name": "R. Sharma",
                "emergency_contact_phone": "9876543210",
                "emergency_contact_relation": "Father",
                "tenth_percentage": 91.4,
                "tenth_board": "CBSE",
                "tenth_year": 2022
            })
        }

        fn router(&self, caller: CallerIdentity) -> Router {
            Router::new()
                .merge(super::applications::router())
                .merge(super::documents::router(self.state.config.max_upload_bytes))
                .merge(super::programs::router())
                .merge(super::events::router())
                .layer(Extension(caller))
                .with_state(self.state.clone())
        }

        /// Send a request as `caller`; a `None` caller is anonymous.
        pub(crate) async fn send(
            &self,
            caller: Option<CallerIdentity>,
            request: Request<Body>,
        ) -> (StatusCode, serde_json::Value) {
            let router = match caller {
                Some(caller) => self.router(caller),
                None => Router::new()
                    .merge(super::programs::router())
                    .with_state(self.state.clone()),
            };
            let response = router.oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let body = if bytes.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                    serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
                })
            };
            (status, body)
        }

        pub(crate) async fn call(
            &self,
            caller: CallerIdentity,
            method: &str,
            uri: &str,
            body: Option<serde_json::Value>,
        ) -> (StatusCode, serde_json::Value) {
            let builder = Request::builder().method(method).uri(uri);
            let request = match body {
                Some(json) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            self.send(Some(caller), request).await
        }
    }

    /// Build a `multipart/form-data` body from text fields and one file.
    pub(crate) fn multipart(
        fields: &[(&str, &str)],
        file: Option<(&str, &[u8])>,
    ) -> (String, Vec<u8>) {
        let boundary = "admit-test-boundary";
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((filename, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={boundary}"), body)
    }
}
