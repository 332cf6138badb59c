use std::sync::Arc;

use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use paperclip::actix::{api_v2_operation, web};

use crate::api::{BookId, BookResponse, BooksResponse, MessageResponse, Money, NewBook};
use crate::capability::{require_capability, Capability};
use crate::error::ApiError;
use crate::library_repository::LibraryRepository;
use crate::session::AuthenticatedUser;

/// Highest catalog price accepted, $1,000,000
pub const MAX_BOOK_PRICE: Money = Money::from_cents(100_000_000);

/// Every field is required, price and quantity must be positive
fn validate_new_book(book: NewBook) -> Result<NewBook, ApiError> {
    let book = NewBook {
        title: book.title.trim().to_string(),
        author: book.author.trim().to_string(),
        description: book.description.trim().to_string(),
        ..book
    };
    if book.title.is_empty()
        || book.author.is_empty()
        || book.description.is_empty()
        || !book.price.is_positive()
        || book.quantity <= 0
    {
        return Err(ApiError::InvalidInput(
            "Please provide all required fields".to_string(),
        ));
    }
    if book.price > MAX_BOOK_PRICE {
        return Err(ApiError::InvalidInput(format!(
            "Price must not exceed {}",
            MAX_BOOK_PRICE
        )));
    }
    Ok(book)
}

#[api_v2_operation]
pub async fn add_book(
    user: AuthenticatedUser,
    repository: Data<Arc<dyn LibraryRepository>>,
    book: web::Json<NewBook>,
) -> Result<HttpResponse, Error> {
    require_capability(user.0.role, Capability::ManageCatalog)?;
    let book = validate_new_book(book.into_inner())?;

    let book = repository.add_book(book).await.map_err(ApiError::from)?;
    tracing::info!(book_id = book.id, quantity = book.quantity, "Book added");
    Ok(HttpResponse::Created().json(BookResponse {
        success: true,
        message: "Book added successfully".to_string(),
        book,
    }))
}

#[api_v2_operation]
pub async fn get_all_books(
    user: AuthenticatedUser,
    repository: Data<Arc<dyn LibraryRepository>>,
) -> Result<HttpResponse, Error> {
    require_capability(user.0.role, Capability::BrowseCatalog)?;
    let books = repository.list_books().await.map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(BooksResponse {
        success: true,
        books,
    }))
}

#[api_v2_operation]
pub async fn delete_book(
    user: AuthenticatedUser,
    repository: Data<Arc<dyn LibraryRepository>>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    require_capability(user.0.role, Capability::ManageCatalog)?;
    let book_id = book_id.into_inner();

    repository
        .delete_book(book_id)
        .await
        .map_err(ApiError::from)?;
    tracing::info!(book_id, "Book deleted");
    Ok(HttpResponse::Ok().json(MessageResponse::ok("Book deleted successfully")))
}
