use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use clinic_be::db::MemoryStore;
use clinic_be::files::FileStorage;
use clinic_be::model::user::UserCreate;
use clinic_be::routes::app_router;
use clinic_be::secured::AesFieldCipher;
use clinic_be::services::accounts;
use clinic_be::state::AppState;

struct TestApp {
    app: Router,
    state: AppState,
    _media: TempDir,
}

fn setup_with_guard(guard: bool) -> TestApp {
    let media = TempDir::new().unwrap();
    let cipher = AesFieldCipher::from_hex(&AesFieldCipher::generate_key_hex()).unwrap();
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        Arc::new(cipher),
        FileStorage::new(media.path().to_path_buf()),
        guard,
    );
    TestApp {
        app: app_router(state.clone(), true),
        state,
        _media: media,
    }
}

fn setup() -> TestApp {
    setup_with_guard(true)
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn json(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Token {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let (status, bytes) = self.send(request).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Registered, activated and logged-in account; returns (user id, token).
    async fn account(&self, first: &str, phone: &str, email: &str) -> (String, String) {
        let registration = accounts::create_user(
            &self.state,
            UserCreate {
                first_name: first.into(),
                last_name: "Doe".into(),
                phone_number: phone.into(),
                email: email.into(),
                gender: "Woman".into(),
                birth_date: NaiveDate::from_ymd_opt(1985, 6, 15).unwrap(),
                password: "password123".into(),
            },
        )
        .await
        .unwrap();
        let uid = registration.user.id.to_string();

        let (status, _) = self
            .json(
                "POST",
                "/auth/users/activation/",
                None,
                Some(json!({ "uid": uid, "token": registration.activation_code })),
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = self
            .json(
                "POST",
                "/auth/token/login/",
                None,
                Some(json!({ "email": email, "password": "password123" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        (uid, body["auth_token"].as_str().unwrap().to_string())
    }

    async fn doctor(&self, token: &str) -> String {
        let (status, body) = self
            .json(
                "POST",
                "/api/doctors",
                Some(token),
                Some(json!({
                    "specialty": "Cardiologist",
                    "phone_general": "9876543210",
                    "cabinet": "101"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    async fn patient(&self, token: &str) -> String {
        let (status, body) = self
            .json(
                "POST",
                "/api/patients",
                Some(token),
                Some(json!({
                    "region": "Region1",
                    "neighborhood": "Neighborhood1",
                    "city": "City1",
                    "allergy": "Pollen",
                    "blood_type": "B+"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }
}

fn registration(email: &str, phone: &str) -> Value {
    json!({
        "first_name": "John",
        "last_name": "Doe",
        "phone_number": phone,
        "email": email,
        "gender": "Male",
        "birth_date": "1990-01-01",
        "password": "password123"
    })
}

#[tokio::test]
async fn health_reports_ok() {
    let t = setup();
    let (status, body) = t.json("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn registration_hides_password_and_rejects_duplicates() {
    let t = setup();
    let (status, body) = t
        .json("POST", "/auth/users/", None, Some(registration("john.doe@example.com", "1234567890")))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["first_name"], "John");
    assert_eq!(body["is_active"], false);
    assert!(body.get("password").is_none());

    let (status, body) = t
        .json("POST", "/auth/users/", None, Some(registration("john.doe@example.com", "0987654321")))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["field"], "email");

    let (status, body) = t
        .json("POST", "/auth/users/", None, Some(registration("other@example.com", "1234567890")))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["field"], "phone_number");
}

#[tokio::test]
async fn invalid_registration_names_the_field() {
    let t = setup();
    let mut payload = registration("john.doe@example.com", "12345");
    let (status, body) = t.json("POST", "/auth/users/", None, Some(payload.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "phone_number");

    payload["phone_number"] = json!("1234567890");
    payload["gender"] = json!("Female");
    let (status, body) = t.json("POST", "/auth/users/", None, Some(payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "gender");
}

#[tokio::test]
async fn inactive_accounts_cannot_log_in() {
    let t = setup();
    t.json("POST", "/auth/users/", None, Some(registration("john.doe@example.com", "1234567890")))
        .await;
    let (status, _) = t
        .json(
            "POST",
            "/auth/token/login/",
            None,
            Some(json!({ "email": "john.doe@example.com", "password": "password123" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn token_session_lifecycle() {
    let t = setup();
    let (uid, token) = t.account("Jane", "1234567890", "jane@example.com").await;

    let (status, body) = t.json("GET", "/auth/users/me/", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], uid.as_str());
    assert_eq!(body["is_active"], true);

    let (status, body) = t
        .json("PATCH", "/auth/users/me/", Some(&token), Some(json!({ "last_name": "Smith" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["last_name"], "Smith");
    assert_eq!(body["first_name"], "Jane");

    let (status, _) = t.json("POST", "/auth/token/logout/", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = t.json("GET", "/auth/users/me/", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn password_change_requires_current_password() {
    let t = setup();
    let (_, token) = t.account("Jane", "1234567890", "jane@example.com").await;

    let (status, body) = t
        .json(
            "POST",
            "/auth/users/set_password/",
            Some(&token),
            Some(json!({ "current_password": "wrong-one", "new_password": "new-password-1" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "current_password");

    let (status, _) = t
        .json(
            "POST",
            "/auth/users/set_password/",
            Some(&token),
            Some(json!({ "current_password": "password123", "new_password": "new-password-1" })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = t
        .json(
            "POST",
            "/auth/token/login/",
            None,
            Some(json!({ "email": "jane@example.com", "password": "new-password-1" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn api_requires_a_token() {
    let t = setup();
    let (status, body) = t.json("GET", "/api/doctors", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = t.json("GET", "/api/doctors", Some("not-a-real-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn doctor_calendar_is_unique_and_ordered() {
    let t = setup();
    let (_, token) = t.account("John", "1234567890", "john.doe@example.com").await;
    let doctor_id = t.doctor(&token).await;
    let hours_uri = format!("/api/doctors/{doctor_id}/hours");

    for (day, from, to) in [(2, "10:00:00", "14:00:00"), (1, "09:00:00", "17:00:00")] {
        let (status, _) = t
            .json(
                "POST",
                &hours_uri,
                Some(&token),
                Some(json!({ "weekday": day, "from_hour": from, "to_hour": to })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = t
        .json(
            "POST",
            &hours_uri,
            Some(&token),
            Some(json!({ "weekday": 1, "from_hour": "09:00:00", "to_hour": "17:00:00" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["field"], "opening_hours");

    let (status, body) = t
        .json("GET", &format!("/api/doctors/{doctor_id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["first_name"], "John");
    assert_eq!(body["specialty"], "Cardiologist");
    let days: Vec<_> = body["opening_hours"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["weekday_display"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(days, vec!["Monday", "Tuesday"]);
}

#[tokio::test]
async fn only_the_doctor_edits_their_profile() {
    let t = setup();
    let (_, doctor_token) = t.account("John", "1234567890", "john.doe@example.com").await;
    let (_, other_token) = t.account("Jane", "0987654321", "jane@example.com").await;
    let doctor_id = t.doctor(&doctor_token).await;

    let (status, _) = t
        .json(
            "PUT",
            &format!("/api/doctors/{doctor_id}"),
            Some(&other_token),
            Some(json!({ "cabinet": "999" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t
        .json(
            "PUT",
            &format!("/api/doctors/{doctor_id}"),
            Some(&doctor_token),
            Some(json!({ "cabinet": "202" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cabinet"], "202");
}

#[tokio::test]
async fn patient_profile_round_trip() {
    let t = setup();
    let (_, token) = t.account("Jane", "1234567890", "jane@example.com").await;
    let patient_id = t.patient(&token).await;

    let (status, body) = t.json("GET", "/api/patients/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], patient_id.as_str());
    assert_eq!(body["blood_type"], "B+");
    assert!(body["street"].is_null());
    assert!(body["medical_insurance_number"].is_null());

    let (status, body) = t
        .json(
            "PUT",
            &format!("/api/patients/{patient_id}"),
            Some(&token),
            Some(json!({ "street": "Street1", "medical_insurance_number": "INS-1" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["street"], "Street1");
    assert_eq!(body["medical_insurance_number"], "INS-1");
}

#[tokio::test]
async fn records_flow_with_attachment() {
    let t = setup();
    let (_, doctor_token) = t.account("John", "1234567890", "john.doe@example.com").await;
    let (_, patient_token) = t.account("Jane", "0987654321", "jane@example.com").await;
    let (_, stranger_token) = t.account("Sam", "5556667777", "sam@example.com").await;
    t.doctor(&doctor_token).await;
    let patient_id = t.patient(&patient_token).await;

    let (status, record) = t
        .json(
            "POST",
            "/api/records",
            Some(&doctor_token),
            Some(json!({ "patient": patient_id, "description": "Chest pain, ECG normal" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let record_id = record["id"].as_str().unwrap().to_string();
    let record_uri = format!("/api/records/{record_id}");

    let (status, body) = t.json("GET", &record_uri, Some(&patient_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["description"], "Chest pain, ECG normal");

    let (status, _) = t.json("GET", &record_uri, Some(&stranger_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t
        .json("PUT", &record_uri, Some(&patient_token), Some(json!({ "description": "edited" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let upload = Request::builder()
        .method("PUT")
        .uri(format!("{record_uri}/file?filename=ecg.txt"))
        .header(header::AUTHORIZATION, format!("Token {doctor_token}"))
        .body(Body::from("ECG: sinus rhythm"))
        .unwrap();
    let (status, _) = t.send(upload).await;
    assert_eq!(status, StatusCode::OK);

    let download = Request::builder()
        .uri(format!("{record_uri}/file"))
        .header(header::AUTHORIZATION, format!("Token {patient_token}"))
        .body(Body::empty())
        .unwrap();
    let (status, bytes) = t.send(download).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"ECG: sinus rhythm");

    let (status, listed) = t
        .json("GET", &format!("/api/records?patient={patient_id}"), Some(&patient_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert!(listed[0]["file_analysis"].as_str().unwrap().starts_with("record/"));

    let (status, listed) = t
        .json("GET", &format!("/api/records?patient={patient_id}"), Some(&stranger_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn patients_cannot_create_records() {
    let t = setup();
    let (_, patient_token) = t.account("Jane", "0987654321", "jane@example.com").await;
    let patient_id = t.patient(&patient_token).await;
    let (status, _) = t
        .json(
            "POST",
            "/api/records",
            Some(&patient_token),
            Some(json!({ "patient": patient_id, "description": "self diagnosis" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn self_authored_record_is_rejected() {
    let t = setup();
    let (_, token) = t.account("John", "1234567890", "john.doe@example.com").await;
    t.doctor(&token).await;
    let patient_id = t.patient(&token).await;

    let (status, body) = t
        .json(
            "POST",
            "/api/records",
            Some(&token),
            Some(json!({ "patient": patient_id, "description": "Self check" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "A doctor cannot create a record for himself/herself.");
    assert_eq!(body["field"], "doctor_author");
}

#[tokio::test]
async fn self_authored_record_allowed_when_guard_is_off() {
    let t = setup_with_guard(false);
    let (_, token) = t.account("John", "1234567890", "john.doe@example.com").await;
    t.doctor(&token).await;
    let patient_id = t.patient(&token).await;

    let (status, _) = t
        .json(
            "POST",
            "/api/records",
            Some(&token),
            Some(json!({ "patient": patient_id, "description": "Self check" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn authoring_doctor_cannot_be_deleted() {
    let t = setup();
    let (_, doctor_token) = t.account("John", "1234567890", "john.doe@example.com").await;
    let (_, patient_token) = t.account("Jane", "0987654321", "jane@example.com").await;
    let doctor_id = t.doctor(&doctor_token).await;
    let patient_id = t.patient(&patient_token).await;
    t.json(
        "POST",
        "/api/records",
        Some(&doctor_token),
        Some(json!({ "patient": patient_id, "description": "Follow-up" })),
    )
    .await;

    let (status, _) = t
        .json("DELETE", &format!("/api/doctors/{doctor_id}"), Some(&doctor_token), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn malformed_input_is_a_json_bad_request() {
    let t = setup();
    let mut payload = registration("john.doe@example.com", "1234567890");
    payload["birth_date"] = json!("01/01/1990");
    let (status, body) = t.json("POST", "/auth/users/", None, Some(payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("birth_date"));

    let (_, token) = t.account("John", "1234567890", "john.doe@example.com").await;
    let (status, body) = t.json("GET", "/api/records/not-a-uuid", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = t
        .json("GET", "/api/records?patient=nope", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let missing_type = Request::builder()
        .method("POST")
        .uri("/auth/token/login/")
        .body(Body::from(r#"{"email":"john.doe@example.com","password":"password123"}"#))
        .unwrap();
    let (status, bytes) = t.send(missing_type).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn upload_without_filename_is_rejected() {
    let t = setup();
    let (_, doctor_token) = t.account("John", "1234567890", "john.doe@example.com").await;
    let (_, patient_token) = t.account("Jane", "0987654321", "jane@example.com").await;
    t.doctor(&doctor_token).await;
    let patient_id = t.patient(&patient_token).await;
    let (_, record) = t
        .json(
            "POST",
            "/api/records",
            Some(&doctor_token),
            Some(json!({ "patient": patient_id, "description": "Checkup" })),
        )
        .await;

    let upload = Request::builder()
        .method("PUT")
        .uri(format!("/api/records/{}/file", record["id"].as_str().unwrap()))
        .header(header::AUTHORIZATION, format!("Token {doctor_token}"))
        .body(Body::from("scan"))
        .unwrap();
    let (status, bytes) = t.send(upload).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn activation_stops_accepting_codes_after_repeated_failures() {
    let t = setup();
    let registration = accounts::create_user(
        &t.state,
        UserCreate {
            first_name: "John".into(),
            last_name: "Doe".into(),
            phone_number: "1234567890".into(),
            email: "john.doe@example.com".into(),
            gender: "Male".into(),
            birth_date: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            password: "password123".into(),
        },
    )
    .await
    .unwrap();
    let uid = registration.user.id.to_string();
    let code = registration.activation_code;
    let wrong = if code == "999999" { "999998" } else { "999999" };

    for _ in 0..accounts::MAX_ACTIVATION_ATTEMPTS {
        let (status, body) = t
            .json("POST", "/auth/users/activation/", None, Some(json!({ "uid": uid, "token": wrong })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "token");
    }

    let (status, _) = t
        .json("POST", "/auth/users/activation/", None, Some(json!({ "uid": uid, "token": code })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .json(
            "POST",
            "/auth/users/resend_activation/",
            None,
            Some(json!({ "email": "nobody@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
