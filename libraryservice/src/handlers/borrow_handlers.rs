use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use chrono::Utc;
use paperclip::actix::{api_v2_operation, web};

use crate::api::{
    BookId, BorrowRecordsResponse, BorrowRequest, MessageResponse, MyBorrowedBooksResponse,
};
use crate::borrow_engine::BorrowEngine;
use crate::session::AuthenticatedUser;

#[api_v2_operation]
pub async fn record_borrow_book(
    user: AuthenticatedUser,
    borrow_engine: Data<BorrowEngine>,
    book_id: web::Path<BookId>,
    request: web::Json<BorrowRequest>,
) -> Result<HttpResponse, Error> {
    borrow_engine
        .record_borrow(
            user.0.role,
            book_id.into_inner(),
            &request.email,
            Utc::now(),
        )
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse::ok("Borrowed book recorded successfully")))
}

#[api_v2_operation]
pub async fn return_borrowed_book(
    user: AuthenticatedUser,
    borrow_engine: Data<BorrowEngine>,
    book_id: web::Path<BookId>,
    request: web::Json<BorrowRequest>,
) -> Result<HttpResponse, Error> {
    let receipt = borrow_engine
        .return_borrow(
            user.0.role,
            book_id.into_inner(),
            &request.email,
            Utc::now(),
        )
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse::ok(receipt.message())))
}

#[api_v2_operation]
pub async fn my_borrowed_books(
    user: AuthenticatedUser,
    borrow_engine: Data<BorrowEngine>,
) -> Result<HttpResponse, Error> {
    let borrowed_books = borrow_engine.my_borrowed_books(&user.0)?;
    Ok(HttpResponse::Ok().json(MyBorrowedBooksResponse {
        success: true,
        borrowed_books,
    }))
}

#[api_v2_operation]
pub async fn borrowed_books_by_users(
    user: AuthenticatedUser,
    borrow_engine: Data<BorrowEngine>,
) -> Result<HttpResponse, Error> {
    let borrowed_books = borrow_engine.borrow_records(user.0.role).await?;
    Ok(HttpResponse::Ok().json(BorrowRecordsResponse {
        success: true,
        borrowed_books,
    }))
}
