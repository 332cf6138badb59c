use std::sync::Arc;

use actix_web::web::{Data, JsonConfig, PathConfig};
use paperclip::actix::web;

use crate::auth_engine::AuthEngine;
use crate::borrow_engine::BorrowEngine;
use crate::error::ApiError;
use crate::handlers::{self, auth_handlers, book_handlers, borrow_handlers, user_handlers};
use crate::library_repository::LibraryRepository;
use crate::mailer::Mailer;
use crate::session::SessionTokens;

/// Shared state handed to every worker
#[derive(Clone)]
pub struct LibraryAppData {
    pub repository: Data<Arc<dyn LibraryRepository>>,
    pub sessions: Data<SessionTokens>,
    pub auth_engine: Data<AuthEngine>,
    pub borrow_engine: Data<BorrowEngine>,
}

impl LibraryAppData {
    pub fn new(
        repository: Arc<dyn LibraryRepository>,
        mailer: Arc<dyn Mailer>,
        sessions: Arc<SessionTokens>,
        frontend_url: &str,
    ) -> Self {
        Self {
            auth_engine: Data::new(AuthEngine::new(
                repository.clone(),
                mailer,
                sessions.clone(),
                frontend_url,
            )),
            borrow_engine: Data::new(BorrowEngine::new(repository.clone())),
            sessions: Data::from(sessions),
            repository: Data::new(repository),
        }
    }
}

/// Malformed bodies are reported like any other invalid input
pub fn json_config() -> JsonConfig {
    JsonConfig::default()
        .error_handler(|err, _req| ApiError::InvalidInput(format!("Invalid request body: {err}")).into())
}

pub fn path_config() -> PathConfig {
    PathConfig::default()
        .error_handler(|err, _req| ApiError::InvalidInput(format!("Invalid path: {err}")).into())
}

pub fn config_app(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(handlers::health)))
        .service(
            web::scope("/api/v1")
                .service(
                    web::scope("/auth")
                        .service(
                            web::resource("/register")
                                .route(web::post().to(auth_handlers::register)),
                        )
                        .service(
                            web::resource("/verify-otp")
                                .route(web::post().to(auth_handlers::verify_otp)),
                        )
                        .service(web::resource("/login").route(web::post().to(auth_handlers::login)))
                        .service(
                            web::resource("/logout").route(web::get().to(auth_handlers::logout)),
                        )
                        .service(web::resource("/me").route(web::get().to(auth_handlers::me)))
                        .service(
                            web::resource("/password/forgot")
                                .route(web::post().to(auth_handlers::forgot_password)),
                        )
                        .service(
                            web::resource("/password/reset/{token}")
                                .route(web::put().to(auth_handlers::reset_password)),
                        )
                        .service(
                            web::resource("/password/update")
                                .route(web::put().to(auth_handlers::update_password)),
                        ),
                )
                .service(
                    web::scope("/book")
                        .service(
                            web::resource("/admin/add").route(web::post().to(book_handlers::add_book)),
                        )
                        .service(
                            web::resource("/all").route(web::get().to(book_handlers::get_all_books)),
                        )
                        .service(
                            web::resource("/delete/{book_id}")
                                .route(web::delete().to(book_handlers::delete_book)),
                        ),
                )
                .service(
                    web::scope("/borrow")
                        .service(
                            web::resource("/record-borrow-book/{book_id}")
                                .route(web::post().to(borrow_handlers::record_borrow_book)),
                        )
                        .service(
                            web::resource("/return-borrowed-book/{book_id}")
                                .route(web::put().to(borrow_handlers::return_borrowed_book)),
                        )
                        .service(
                            web::resource("/my-borrowed-books")
                                .route(web::get().to(borrow_handlers::my_borrowed_books)),
                        )
                        .service(
                            web::resource("/borrowed-books-by-users")
                                .route(web::get().to(borrow_handlers::borrowed_books_by_users)),
                        ),
                )
                .service(
                    web::scope("/user")
                        .service(
                            web::resource("/all").route(web::get().to(user_handlers::get_all_users)),
                        )
                        .service(
                            web::resource("/add/new-admin")
                                .route(web::post().to(user_handlers::add_new_admin)),
                        ),
                ),
        );
}
