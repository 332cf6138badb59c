use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use paperclip::actix::Apiv2Schema;
use serde::{Deserialize, Deserializer, Serialize};

pub use crate::money::Money;

pub type BookId = i32;
pub type UserId = i32;
pub type BorrowId = i32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Apiv2Schema)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Admin => "Admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "User" => Ok(Role::User),
            "Admin" => Ok(Role::Admin),
            other => Err(format!("Unknown role {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
/// Book in the catalog, `availability` is always `quantity > 0`
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub description: String,
    pub price: Money,
    pub quantity: i32,
    pub availability: bool,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
#[serde(default)]
/// Body of the admin "add book" call
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub description: String,
    pub price: Money,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
/// Copy of a borrow kept inside the account document
pub struct BorrowedBookEntry {
    pub borrow_id: BorrowId,
    pub book_id: BookId,
    pub book_title: String,
    pub borrowed_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
/// Borrower details captured when the book was lent
pub struct BorrowerSnapshot {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
/// Ledger entry, the source of truth for a single loan
pub struct BorrowRecord {
    pub id: BorrowId,
    pub user: BorrowerSnapshot,
    pub book: BookId,
    pub price: Money,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub fine: Money,
    pub notified: bool,
}

impl BorrowRecord {
    pub fn is_open(&self) -> bool {
        self.return_date.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
/// Account as shown to clients, never carries credentials or pending tokens
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub account_verified: bool,
    pub borrowed_books: Vec<BorrowedBookEntry>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Apiv2Schema)]
#[serde(default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Apiv2Schema)]
#[serde(default)]
pub struct VerifyOtpRequest {
    pub email: String,
    /// Accepted both as a JSON string and as a JSON number
    #[serde(deserialize_with = "string_or_number")]
    pub otp: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Apiv2Schema)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Apiv2Schema)]
#[serde(default)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Apiv2Schema)]
#[serde(default, rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Apiv2Schema)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_new_password: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Apiv2Schema)]
#[serde(default)]
/// Identifies the borrower of a book by email
pub struct BorrowRequest {
    pub email: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Apiv2Schema)]
#[serde(default)]
pub struct NewAdminRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
/// Plain acknowledgement, also the shape of every error response
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Apiv2Schema)]
/// Returned whenever a session is opened, the token is also set as cookie
pub struct SessionResponse {
    pub success: bool,
    pub message: String,
    pub user: UserProfile,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Apiv2Schema)]
pub struct ProfileResponse {
    pub success: bool,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize, Apiv2Schema)]
pub struct BookResponse {
    pub success: bool,
    pub message: String,
    pub book: Book,
}

#[derive(Debug, Clone, Serialize, Deserialize, Apiv2Schema)]
pub struct BooksResponse {
    pub success: bool,
    pub books: Vec<Book>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct MyBorrowedBooksResponse {
    pub success: bool,
    pub borrowed_books: Vec<BorrowedBookEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRecordsResponse {
    pub success: bool,
    pub borrowed_books: Vec<BorrowRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Apiv2Schema)]
pub struct UsersResponse {
    pub success: bool,
    pub users: Vec<UserProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Apiv2Schema)]
pub struct NewAdminResponse {
    pub success: bool,
    pub message: String,
    pub admin: UserProfile,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(u64),
    }

    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(value) => value,
        StringOrNumber::Number(value) => value.to_string(),
    })
}
