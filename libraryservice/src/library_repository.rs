pub use in_memory_library_repository::InMemoryLibraryRepository;
pub use postgres_library_repository::{
    PostgresLibraryRepository, PostgresLibraryRepositoryConfig,
};

use chrono::{DateTime, Utc};

use crate::api::{
    Book, BookId, BorrowId, BorrowRecord, BorrowedBookEntry, NewBook, Role, UserId, UserProfile,
};

mod in_memory_library_repository;
mod postgres_library_repository;

/// Days between borrowing a book and its due date
pub const LOAN_PERIOD_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationCode {
    pub code: u32,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Pending password reset, only the hash of the token sent by email is kept
pub struct PasswordReset {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub account_verified: bool,
    pub verification: Option<VerificationCode>,
    pub password_reset: Option<PasswordReset>,
    pub borrowed_books: Vec<BorrowedBookEntry>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            account_verified: self.account_verified,
            borrowed_books: self.borrowed_books.clone(),
            created_at: self.created_at,
        }
    }

    pub fn open_borrow_of(&self, book_id: BookId) -> Option<&BorrowedBookEntry> {
        self.borrowed_books
            .iter()
            .find(|entry| entry.book_id == book_id && !entry.returned)
    }
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub account_verified: bool,
    pub verification: Option<VerificationCode>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
/// Outcome of closing a loan: the closed ledger entry and the book after restocking
pub struct ReturnedBorrow {
    pub record: BorrowRecord,
    pub book: Book,
}

#[derive(thiserror::Error, Debug)]
pub enum BooksRepositoryError {
    #[error("Book {0} not found")]
    NotFound(BookId),

    #[error("Book {0} has open borrows")]
    HasOpenBorrows(BookId),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[derive(thiserror::Error, Debug)]
pub enum AccountsRepositoryError {
    #[error("User {0} not found")]
    NotFound(UserId),

    #[error("Verified account for {0} already exists")]
    EmailTaken(String),

    #[error("Failed to deserialize account: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[derive(thiserror::Error, Debug)]
pub enum BorrowsRepositoryError {
    #[error("Book {0} not found")]
    BookNotFound(BookId),

    #[error("Verified user {0} not found")]
    UserNotFound(String),

    #[error("Book {0} not available")]
    BookUnavailable(BookId),

    #[error("Book {0} already borrowed by the user")]
    AlreadyBorrowed(BookId),

    #[error("Book {0} not borrowed by the user")]
    NotBorrowed(BookId),

    #[error("No open ledger entry for book {0}")]
    LedgerEntryMissing(BookId),

    #[error("Failed to deserialize borrow: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[async_trait::async_trait]
pub trait BooksRepository: Send + Sync {
    /// Adds book to the catalog, availability is derived from the quantity
    async fn add_book(&self, book: NewBook) -> Result<Book, BooksRepositoryError>;
    async fn get_book(&self, book_id: BookId) -> Result<Book, BooksRepositoryError>;
    /// Lists all books ordered by id
    async fn list_books(&self) -> Result<Vec<Book>, BooksRepositoryError>;
    /// Removes a book that nobody currently holds
    async fn delete_book(&self, book_id: BookId) -> Result<(), BooksRepositoryError>;
}

#[async_trait::async_trait]
pub trait AccountsRepository: Send + Sync {
    async fn create_account(&self, account: NewAccount) -> Result<UserId, AccountsRepositoryError>;

    async fn get_account(&self, user_id: UserId) -> Result<Account, AccountsRepositoryError>;

    async fn find_verified_account(
        &self,
        email: &str,
    ) -> Result<Option<Account>, AccountsRepositoryError>;

    /// Unverified registration attempts for the email, newest first
    async fn list_unverified_accounts(
        &self,
        email: &str,
    ) -> Result<Vec<Account>, AccountsRepositoryError>;

    async fn list_verified_accounts(&self) -> Result<Vec<Account>, AccountsRepositoryError>;

    /// Marks an unverified account verified and drops its code.
    /// Returns false if the account was not waiting for verification anymore.
    async fn mark_verified(&self, user_id: UserId) -> Result<bool, AccountsRepositoryError>;

    /// Deletes every unverified attempt for the email except `keep`, returns number deleted
    async fn delete_unverified_except(
        &self,
        email: &str,
        keep: UserId,
    ) -> Result<u64, AccountsRepositoryError>;

    /// Deletes unverified accounts created before `cutoff`, returns number deleted
    async fn delete_unverified_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, AccountsRepositoryError>;

    /// Replaces (or clears) the pending password reset
    async fn set_password_reset(
        &self,
        user_id: UserId,
        reset: Option<PasswordReset>,
    ) -> Result<(), AccountsRepositoryError>;

    /// Finds the verified account holding the reset token hash, expired or not
    async fn find_by_reset_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<Account>, AccountsRepositoryError>;

    /// Stores new password and consumes the reset token.
    /// Returns false if the token was already consumed or replaced.
    async fn reset_password(
        &self,
        user_id: UserId,
        token_hash: &str,
        password_hash: String,
    ) -> Result<bool, AccountsRepositoryError>;

    /// Stores new password and drops any pending reset token
    async fn update_password(
        &self,
        user_id: UserId,
        password_hash: String,
    ) -> Result<(), AccountsRepositoryError>;
}

#[async_trait::async_trait]
pub trait BorrowsRepository: Send + Sync {
    /// Lends a copy of the book to the verified user with the email.
    /// Catalog quantity, account mirror and ledger change together or not at all.
    async fn record_borrow(
        &self,
        book_id: BookId,
        email: &str,
        borrowed_at: DateTime<Utc>,
    ) -> Result<BorrowRecord, BorrowsRepositoryError>;

    /// Closes the open loan of the book by the user and computes its fine.
    /// Catalog quantity, account mirror and ledger change together or not at all.
    async fn return_borrow(
        &self,
        book_id: BookId,
        email: &str,
        returned_at: DateTime<Utc>,
    ) -> Result<ReturnedBorrow, BorrowsRepositoryError>;

    /// Whole ledger ordered by id
    async fn list_borrow_records(&self) -> Result<Vec<BorrowRecord>, BorrowsRepositoryError>;

    /// Open loans due before `due_before` whose borrower was not reminded yet
    async fn list_overdue_unnotified(
        &self,
        due_before: DateTime<Utc>,
    ) -> Result<Vec<BorrowRecord>, BorrowsRepositoryError>;

    /// Returns false if the entry was already marked
    async fn mark_notified(&self, borrow_id: BorrowId) -> Result<bool, BorrowsRepositoryError>;
}

/// Catalog, accounts and ledger kept in one store
pub trait LibraryRepository: BooksRepository + AccountsRepository + BorrowsRepository {}

impl<T> LibraryRepository for T where T: BooksRepository + AccountsRepository + BorrowsRepository {}
