use actix_web::{Error, HttpResponse};
use paperclip::actix::api_v2_operation;

use crate::api::SessionResponse;
use crate::auth_engine::Session;
use crate::session::SessionTokens;

pub mod auth_handlers;
pub mod book_handlers;
pub mod borrow_handlers;
pub mod user_handlers;

#[api_v2_operation]
pub async fn health() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().finish())
}

/// Sets the session cookie and mirrors the token in the body
fn session_response(sessions: &SessionTokens, session: Session, message: &str) -> HttpResponse {
    HttpResponse::Ok()
        .cookie(sessions.cookie(&session.token))
        .json(SessionResponse {
            success: true,
            message: message.to_string(),
            user: session.account.profile(),
            token: session.token,
        })
}

#[cfg(test)]
mod handler_tests {
    use std::sync::Arc;

    use actix_web::cookie::Cookie;
    use actix_web::dev::{Service, ServiceResponse};
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use chrono::Utc;
    use paperclip::actix::OpenApiExt;
    use serde_json::json;

    use crate::api::{
        BookResponse, BooksResponse, BorrowRecordsResponse, MessageResponse,
        MyBorrowedBooksResponse, ProfileResponse, UsersResponse,
    };
    use crate::app_config::{config_app, json_config, path_config, LibraryAppData};
    use crate::library_repository::InMemoryLibraryRepository;
    use crate::mailer::RecordingMailer;
    use crate::settings::{BootstrapAdminSettings, SessionSettings};

    use super::*;

    const ADMIN_EMAIL: &str = "admin@library.test";
    const ADMIN_PASSWORD: &str = "adminpass1";

    async fn app_data(mailer: Arc<RecordingMailer>) -> LibraryAppData {
        let data = LibraryAppData::new(
            Arc::new(InMemoryLibraryRepository::default()),
            mailer,
            Arc::new(SessionTokens::new(&SessionSettings::default())),
            "http://frontend",
        );
        data.auth_engine
            .ensure_bootstrap_admin(
                &BootstrapAdminSettings {
                    name: "Admin".to_string(),
                    email: ADMIN_EMAIL.to_string(),
                    password: ADMIN_PASSWORD.to_string(),
                },
                Utc::now(),
            )
            .await
            .unwrap();
        data
    }

    async fn library_app(
        data: LibraryAppData,
    ) -> impl Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error> {
        test::init_service(
            App::new()
                .wrap_api()
                .app_data(json_config())
                .app_data(path_config())
                .app_data(data.repository.clone())
                .app_data(data.sessions.clone())
                .app_data(data.auth_engine.clone())
                .app_data(data.borrow_engine.clone())
                .configure(config_app)
                .build(),
        )
        .await
    }

    fn session_cookie(response: &ServiceResponse) -> Cookie<'static> {
        response
            .response()
            .cookies()
            .find(|cookie| cookie.name() == "token")
            .map(|cookie| cookie.into_owned())
            .expect("No session cookie")
    }

    async fn login(
        app: &impl Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
        email: &str,
        password: &str,
    ) -> Cookie<'static> {
        let response = test::call_service(
            app,
            test::TestRequest::post()
                .uri("/api/v1/auth/login")
                .set_json(json!({"email": email, "password": password}))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        session_cookie(&response)
    }

    fn verification_code(mailer: &RecordingMailer, email: &str) -> String {
        let sent = mailer.sent_to(email);
        sent.last()
            .unwrap()
            .html_body
            .split(|c: char| !c.is_ascii_digit())
            .find(|part| part.len() == 5)
            .unwrap()
            .to_string()
    }

    #[actix_web::test]
    async fn test_health() {
        let app = library_app(app_data(Arc::new(RecordingMailer::default())).await).await;
        let response =
            test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[actix_web::test]
    /// Registration through the api
    /// 1. Registers - verification code goes out by email
    /// 2. Verifies with numeric otp - session cookie set, token mirrored in body
    /// 3. Reads own profile with the cookie and with a bearer header
    /// 4. Logs out - cookie expired
    async fn test_register_verify_and_session() {
        let mailer = Arc::new(RecordingMailer::default());
        let app = library_app(app_data(mailer.clone()).await).await;

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/auth/register")
                .set_json(json!({"name": "Ada", "email": "ada@example.com", "password": "password1"}))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: MessageResponse = test::read_body_json(response).await;
        assert_eq!(body, MessageResponse::ok("Verification code sent successfully"));

        let otp: u32 = verification_code(&mailer, "ada@example.com").parse().unwrap();
        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/auth/verify-otp")
                .set_json(json!({"email": "ada@example.com", "otp": otp}))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = session_cookie(&response);
        assert_eq!(cookie.http_only(), Some(true));
        let session: SessionResponse = test::read_body_json(response).await;
        assert_eq!(session.message, "Account verified successfully");
        assert_eq!(session.token, cookie.value());
        assert!(session.user.account_verified);

        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/v1/auth/me")
                .cookie(cookie.clone())
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let profile: ProfileResponse = test::read_body_json(response).await;
        assert_eq!(profile.user.email, "ada@example.com");

        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/v1/auth/me")
                .insert_header(("Authorization", format!("Bearer {}", session.token)))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/v1/auth/logout")
                .cookie(cookie)
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(session_cookie(&response).value(), "");
    }

    #[actix_web::test]
    async fn test_errors_are_uniform_json() {
        let app = library_app(app_data(Arc::new(RecordingMailer::default())).await).await;

        let response = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/v1/auth/me").to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: MessageResponse = test::read_body_json(response).await;
        assert_eq!(body, MessageResponse::failure("User is not authenticated"));

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/auth/login")
                .set_json(json!({"email": ADMIN_EMAIL, "password": "wrongpass1"}))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: MessageResponse = test::read_body_json(response).await;
        assert!(!body.success);

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/auth/login")
                .insert_header(("Content-Type", "application/json"))
                .set_payload("{not json")
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: MessageResponse = test::read_body_json(response).await;
        assert!(!body.success);

        let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
        let response = test::call_service(
            &app,
            test::TestRequest::delete()
                .uri("/api/v1/book/delete/not-a-number")
                .cookie(admin)
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    /// Lending through the api
    /// 1. Admin adds a book with one copy
    /// 2. Admin lends it to a verified reader
    /// 3. Reader sees it in own borrowed books but cannot read the ledger
    /// 4. Second lend fails with conflict, deletion fails while lent
    /// 5. Admin takes it back - on time, price only
    async fn test_borrow_lifecycle() {
        let mailer = Arc::new(RecordingMailer::default());
        let data = app_data(mailer.clone()).await;
        let app = library_app(data.clone()).await;
        let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/book/admin/add")
                .cookie(admin.clone())
                .set_json(json!({
                    "title": "Dune",
                    "author": "Frank Herbert",
                    "description": "Desert planet",
                    "price": 12.3,
                    "quantity": 1
                }))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let added: BookResponse = test::read_body_json(response).await;
        assert!(added.book.availability);
        let book_id = added.book.id;

        data.auth_engine
            .register(
                crate::api::RegisterRequest {
                    name: "Reader".to_string(),
                    email: "reader@example.com".to_string(),
                    password: "password1".to_string(),
                },
                Utc::now(),
            )
            .await
            .unwrap();
        let reader_session = data
            .auth_engine
            .verify_otp(
                crate::api::VerifyOtpRequest {
                    email: "reader@example.com".to_string(),
                    otp: verification_code(&mailer, "reader@example.com"),
                },
                Utc::now(),
            )
            .await
            .unwrap();
        let reader = data.sessions.cookie(&reader_session.token);

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/api/v1/borrow/record-borrow-book/{book_id}"))
                .cookie(reader.clone())
                .set_json(json!({"email": "reader@example.com"}))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/api/v1/borrow/record-borrow-book/{book_id}"))
                .cookie(admin.clone())
                .set_json(json!({"email": "reader@example.com"}))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: MessageResponse = test::read_body_json(response).await;
        assert_eq!(body.message, "Borrowed book recorded successfully");

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/api/v1/borrow/record-borrow-book/{book_id}"))
                .cookie(admin.clone())
                .set_json(json!({"email": "reader@example.com"}))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/v1/borrow/my-borrowed-books")
                .cookie(reader.clone())
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let mine: MyBorrowedBooksResponse = test::read_body_json(response).await;
        assert_eq!(mine.borrowed_books.len(), 1);
        assert_eq!(mine.borrowed_books[0].book_title, "Dune");

        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/v1/borrow/borrowed-books-by-users")
                .cookie(reader.clone())
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body: MessageResponse = test::read_body_json(response).await;
        assert_eq!(body.message, "Role: (User) is not allowed to access this resource");

        let response = test::call_service(
            &app,
            test::TestRequest::delete()
                .uri(&format!("/api/v1/book/delete/{book_id}"))
                .cookie(admin.clone())
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = test::call_service(
            &app,
            test::TestRequest::put()
                .uri(&format!("/api/v1/borrow/return-borrowed-book/{book_id}"))
                .cookie(admin.clone())
                .set_json(json!({"email": "reader@example.com"}))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: MessageResponse = test::read_body_json(response).await;
        assert_eq!(
            body.message,
            "The book has been returned successfully. The total charges are $12.30."
        );

        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/v1/borrow/borrowed-books-by-users")
                .cookie(admin.clone())
                .to_request(),
        )
        .await;
        let ledger: BorrowRecordsResponse = test::read_body_json(response).await;
        assert_eq!(ledger.borrowed_books.len(), 1);
        assert!(!ledger.borrowed_books[0].is_open());

        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/v1/book/all")
                .cookie(reader)
                .to_request(),
        )
        .await;
        let books: BooksResponse = test::read_body_json(response).await;
        assert_eq!(books.books[0].quantity, 1);

        let response = test::call_service(
            &app,
            test::TestRequest::delete()
                .uri(&format!("/api/v1/book/delete/{book_id}"))
                .cookie(admin)
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_add_book_requires_every_field() {
        let app = library_app(app_data(Arc::new(RecordingMailer::default())).await).await;
        let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/book/admin/add")
                .cookie(admin)
                .set_json(json!({"title": "Untitled", "author": "Anon", "price": 5, "quantity": 0}))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: MessageResponse = test::read_body_json(response).await;
        assert_eq!(body.message, "Please provide all required fields");
    }

    #[actix_web::test]
    async fn test_admin_user_management() {
        let app = library_app(app_data(Arc::new(RecordingMailer::default())).await).await;
        let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/user/add/new-admin")
                .cookie(admin.clone())
                .set_json(json!({"name": "Second", "email": "second@library.test", "password": "secondpass"}))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let second = login(&app, "second@library.test", "secondpass").await;
        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/v1/user/all")
                .cookie(second)
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let users: UsersResponse = test::read_body_json(response).await;
        assert_eq!(users.users.len(), 2);
        assert!(users
            .users
            .iter()
            .all(|user| user.role == crate::api::Role::Admin));
    }

    #[actix_web::test]
    async fn test_password_reset_over_http() {
        let mailer = Arc::new(RecordingMailer::default());
        let app = library_app(app_data(mailer.clone()).await).await;

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/auth/password/forgot")
                .set_json(json!({"email": ADMIN_EMAIL}))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: MessageResponse = test::read_body_json(response).await;
        assert_eq!(body.message, format!("Email sent to {ADMIN_EMAIL} successfully"));

        let sent = mailer.sent_to(ADMIN_EMAIL);
        let html = &sent.last().unwrap().html_body;
        let start = html.find("/password/reset/").unwrap() + "/password/reset/".len();
        let token = &html[start..start + 40];

        let response = test::call_service(
            &app,
            test::TestRequest::put()
                .uri(&format!("/api/v1/auth/password/reset/{token}"))
                .set_json(json!({"password": "brandnew1", "confirmPassword": "brandnew1"}))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        session_cookie(&response);

        login(&app, ADMIN_EMAIL, "brandnew1").await;
    }
}
