use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::api::{BookId, BorrowRecord, BorrowedBookEntry, Money, Role};
use crate::capability::{require_capability, Capability};
use crate::credentials::normalize_email;
use crate::error::ApiError;
use crate::library_repository::{Account, LibraryRepository};

/// Charges settled when a book comes back
#[derive(Debug, Clone)]
pub struct ReturnReceipt {
    pub record: BorrowRecord,
    /// Current catalog price of the returned book
    pub book_price: Money,
}

impl ReturnReceipt {
    pub fn total_charge(&self) -> Money {
        self.record.fine + self.book_price
    }

    pub fn message(&self) -> String {
        if self.record.fine.is_positive() {
            format!(
                "The book has been returned successfully. The total charges, including a fine, are {}.",
                self.total_charge()
            )
        } else {
            format!(
                "The book has been returned successfully. The total charges are {}.",
                self.book_price
            )
        }
    }
}

/// Lends and takes back books, keeping catalog, account mirror and ledger in step
pub struct BorrowEngine {
    repository: Arc<dyn LibraryRepository>,
}

fn borrower_email(email: &str) -> Result<String, ApiError> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(ApiError::InvalidInput("Email is required".to_string()));
    }
    Ok(email)
}

impl BorrowEngine {
    pub fn new(repository: Arc<dyn LibraryRepository>) -> Self {
        Self { repository }
    }

    pub async fn record_borrow(
        &self,
        actor_role: Role,
        book_id: BookId,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<BorrowRecord, ApiError> {
        require_capability(actor_role, Capability::ManageBorrows)?;
        let email = borrower_email(email)?;

        let record = self.repository.record_borrow(book_id, &email, now).await?;
        tracing::info!(
            borrow_id = record.id,
            book_id,
            user_id = record.user.id,
            due_date = %record.due_date,
            "Book borrowed"
        );
        Ok(record)
    }

    pub async fn return_borrow(
        &self,
        actor_role: Role,
        book_id: BookId,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<ReturnReceipt, ApiError> {
        require_capability(actor_role, Capability::ManageBorrows)?;
        let email = borrower_email(email)?;

        let returned = self.repository.return_borrow(book_id, &email, now).await?;
        tracing::info!(
            borrow_id = returned.record.id,
            book_id,
            user_id = returned.record.user.id,
            fine = %returned.record.fine,
            "Book returned"
        );
        Ok(ReturnReceipt {
            record: returned.record,
            book_price: returned.book.price,
        })
    }

    /// Mirror list of the signed in account
    pub fn my_borrowed_books(&self, account: &Account) -> Result<Vec<BorrowedBookEntry>, ApiError> {
        require_capability(account.role, Capability::ViewOwnBorrows)?;
        Ok(account.borrowed_books.clone())
    }

    /// Every ledger entry, open and closed
    pub async fn borrow_records(&self, actor_role: Role) -> Result<Vec<BorrowRecord>, ApiError> {
        require_capability(actor_role, Capability::ViewLedger)?;
        Ok(self.repository.list_borrow_records().await?)
    }
}
