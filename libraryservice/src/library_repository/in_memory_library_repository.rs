use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};

use chrono::{DateTime, Duration, Utc};

use crate::api::{
    Book, BookId, BorrowId, BorrowRecord, BorrowedBookEntry, BorrowerSnapshot, Money, NewBook,
    UserId,
};
use crate::fine::calculate_fine;
use crate::library_repository::{
    Account, AccountsRepository, AccountsRepositoryError, BooksRepository, BooksRepositoryError,
    BorrowsRepository, BorrowsRepositoryError, NewAccount, PasswordReset, ReturnedBorrow,
    LOAN_PERIOD_DAYS,
};

#[derive(Default)]
struct LibraryState {
    books: BTreeMap<BookId, Book>,
    accounts: BTreeMap<UserId, Account>,
    borrows: BTreeMap<BorrowId, BorrowRecord>,
}

impl LibraryState {
    fn verified_account_id(&self, email: &str) -> Option<UserId> {
        self.accounts
            .values()
            .find(|account| account.account_verified && account.email == email)
            .map(|account| account.id)
    }
}

/// Whole library behind a single lock, so borrow and return are atomic
pub struct InMemoryLibraryRepository {
    state: parking_lot::RwLock<LibraryState>,
    book_sequence_generator: AtomicI32,
    user_sequence_generator: AtomicI32,
    borrow_sequence_generator: AtomicI32,
}

impl Default for InMemoryLibraryRepository {
    fn default() -> Self {
        Self {
            state: Default::default(),
            book_sequence_generator: Default::default(),
            user_sequence_generator: Default::default(),
            borrow_sequence_generator: Default::default(),
        }
    }
}

#[async_trait::async_trait]
impl BooksRepository for InMemoryLibraryRepository {
    async fn add_book(&self, book: NewBook) -> Result<Book, BooksRepositoryError> {
        let id = self.book_sequence_generator.fetch_add(1, Ordering::Relaxed);
        let book = Book {
            id,
            title: book.title,
            author: book.author,
            description: book.description,
            price: book.price,
            quantity: book.quantity,
            availability: book.quantity > 0,
        };
        self.state.write().books.insert(id, book.clone());
        Ok(book)
    }

    async fn get_book(&self, book_id: BookId) -> Result<Book, BooksRepositoryError> {
        self.state
            .read()
            .books
            .get(&book_id)
            .cloned()
            .ok_or(BooksRepositoryError::NotFound(book_id))
    }

    async fn list_books(&self) -> Result<Vec<Book>, BooksRepositoryError> {
        Ok(self.state.read().books.values().cloned().collect())
    }

    async fn delete_book(&self, book_id: BookId) -> Result<(), BooksRepositoryError> {
        let mut state = self.state.write();
        if !state.books.contains_key(&book_id) {
            return Err(BooksRepositoryError::NotFound(book_id));
        }
        if state
            .borrows
            .values()
            .any(|record| record.book == book_id && record.is_open())
        {
            return Err(BooksRepositoryError::HasOpenBorrows(book_id));
        }
        state.books.remove(&book_id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl AccountsRepository for InMemoryLibraryRepository {
    async fn create_account(&self, account: NewAccount) -> Result<UserId, AccountsRepositoryError> {
        let mut state = self.state.write();
        if account.account_verified && state.verified_account_id(&account.email).is_some() {
            return Err(AccountsRepositoryError::EmailTaken(account.email));
        }
        let id = self.user_sequence_generator.fetch_add(1, Ordering::Relaxed);
        state.accounts.insert(
            id,
            Account {
                id,
                name: account.name,
                email: account.email,
                password_hash: account.password_hash,
                role: account.role,
                account_verified: account.account_verified,
                verification: account.verification,
                password_reset: None,
                borrowed_books: vec![],
                created_at: account.created_at,
            },
        );
        Ok(id)
    }

    async fn get_account(&self, user_id: UserId) -> Result<Account, AccountsRepositoryError> {
        self.state
            .read()
            .accounts
            .get(&user_id)
            .cloned()
            .ok_or(AccountsRepositoryError::NotFound(user_id))
    }

    async fn find_verified_account(
        &self,
        email: &str,
    ) -> Result<Option<Account>, AccountsRepositoryError> {
        let state = self.state.read();
        Ok(state
            .verified_account_id(email)
            .and_then(|id| state.accounts.get(&id).cloned()))
    }

    async fn list_unverified_accounts(
        &self,
        email: &str,
    ) -> Result<Vec<Account>, AccountsRepositoryError> {
        let mut accounts: Vec<Account> = self
            .state
            .read()
            .accounts
            .values()
            .filter(|account| !account.account_verified && account.email == email)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(accounts)
    }

    async fn list_verified_accounts(&self) -> Result<Vec<Account>, AccountsRepositoryError> {
        Ok(self
            .state
            .read()
            .accounts
            .values()
            .filter(|account| account.account_verified)
            .cloned()
            .collect())
    }

    async fn mark_verified(&self, user_id: UserId) -> Result<bool, AccountsRepositoryError> {
        let mut state = self.state.write();
        let email = match state.accounts.get(&user_id) {
            Some(account) if !account.account_verified => account.email.clone(),
            Some(_) => return Ok(false),
            None => return Err(AccountsRepositoryError::NotFound(user_id)),
        };
        if state.verified_account_id(&email).is_some() {
            return Err(AccountsRepositoryError::EmailTaken(email));
        }
        if let Some(account) = state.accounts.get_mut(&user_id) {
            account.account_verified = true;
            account.verification = None;
        }
        Ok(true)
    }

    async fn delete_unverified_except(
        &self,
        email: &str,
        keep: UserId,
    ) -> Result<u64, AccountsRepositoryError> {
        let mut state = self.state.write();
        let before = state.accounts.len();
        state.accounts.retain(|id, account| {
            *id == keep || account.account_verified || account.email != email
        });
        Ok((before - state.accounts.len()) as u64)
    }

    async fn delete_unverified_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, AccountsRepositoryError> {
        let mut state = self.state.write();
        let before = state.accounts.len();
        state
            .accounts
            .retain(|_, account| account.account_verified || account.created_at >= cutoff);
        Ok((before - state.accounts.len()) as u64)
    }

    async fn set_password_reset(
        &self,
        user_id: UserId,
        reset: Option<PasswordReset>,
    ) -> Result<(), AccountsRepositoryError> {
        let mut state = self.state.write();
        let account = state
            .accounts
            .get_mut(&user_id)
            .ok_or(AccountsRepositoryError::NotFound(user_id))?;
        account.password_reset = reset;
        Ok(())
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<Account>, AccountsRepositoryError> {
        Ok(self
            .state
            .read()
            .accounts
            .values()
            .find(|account| {
                account.account_verified
                    && account
                        .password_reset
                        .as_ref()
                        .is_some_and(|reset| reset.token_hash == token_hash)
            })
            .cloned())
    }

    async fn reset_password(
        &self,
        user_id: UserId,
        token_hash: &str,
        password_hash: String,
    ) -> Result<bool, AccountsRepositoryError> {
        let mut state = self.state.write();
        let account = state
            .accounts
            .get_mut(&user_id)
            .ok_or(AccountsRepositoryError::NotFound(user_id))?;
        match &account.password_reset {
            Some(reset) if reset.token_hash == token_hash => {
                account.password_hash = password_hash;
                account.password_reset = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_password(
        &self,
        user_id: UserId,
        password_hash: String,
    ) -> Result<(), AccountsRepositoryError> {
        let mut state = self.state.write();
        let account = state
            .accounts
            .get_mut(&user_id)
            .ok_or(AccountsRepositoryError::NotFound(user_id))?;
        account.password_hash = password_hash;
        account.password_reset = None;
        Ok(())
    }
}

#[async_trait::async_trait]
impl BorrowsRepository for InMemoryLibraryRepository {
    async fn record_borrow(
        &self,
        book_id: BookId,
        email: &str,
        borrowed_at: DateTime<Utc>,
    ) -> Result<BorrowRecord, BorrowsRepositoryError> {
        let mut state = self.state.write();

        let book = state
            .books
            .get(&book_id)
            .cloned()
            .ok_or(BorrowsRepositoryError::BookNotFound(book_id))?;
        let user_id = state
            .verified_account_id(email)
            .ok_or_else(|| BorrowsRepositoryError::UserNotFound(email.to_string()))?;

        if book.quantity <= 0 {
            return Err(BorrowsRepositoryError::BookUnavailable(book_id));
        }
        if state
            .accounts
            .get(&user_id)
            .and_then(|account| account.open_borrow_of(book_id))
            .is_some()
        {
            return Err(BorrowsRepositoryError::AlreadyBorrowed(book_id));
        }

        let due_date = borrowed_at + Duration::days(LOAN_PERIOD_DAYS);
        let borrow_id = self.borrow_sequence_generator.fetch_add(1, Ordering::Relaxed);

        if let Some(stored_book) = state.books.get_mut(&book_id) {
            stored_book.quantity -= 1;
            stored_book.availability = stored_book.quantity > 0;
        }

        let account = state
            .accounts
            .get_mut(&user_id)
            .ok_or_else(|| BorrowsRepositoryError::UserNotFound(email.to_string()))?;
        account.borrowed_books.push(BorrowedBookEntry {
            borrow_id,
            book_id,
            book_title: book.title.clone(),
            borrowed_date: borrowed_at,
            due_date,
            returned: false,
        });
        let user = BorrowerSnapshot {
            id: account.id,
            name: account.name.clone(),
            email: account.email.clone(),
        };

        let record = BorrowRecord {
            id: borrow_id,
            user,
            book: book_id,
            price: book.price,
            borrow_date: borrowed_at,
            due_date,
            return_date: None,
            fine: Money::ZERO,
            notified: false,
        };
        state.borrows.insert(borrow_id, record.clone());
        Ok(record)
    }

    async fn return_borrow(
        &self,
        book_id: BookId,
        email: &str,
        returned_at: DateTime<Utc>,
    ) -> Result<ReturnedBorrow, BorrowsRepositoryError> {
        let mut state = self.state.write();

        if !state.books.contains_key(&book_id) {
            return Err(BorrowsRepositoryError::BookNotFound(book_id));
        }
        let user_id = state
            .verified_account_id(email)
            .ok_or_else(|| BorrowsRepositoryError::UserNotFound(email.to_string()))?;
        let mirror_position = state
            .accounts
            .get(&user_id)
            .and_then(|account| {
                account
                    .borrowed_books
                    .iter()
                    .position(|entry| entry.book_id == book_id && !entry.returned)
            })
            .ok_or(BorrowsRepositoryError::NotBorrowed(book_id))?;
        let borrow_id = state
            .borrows
            .values()
            .find(|record| record.book == book_id && record.user.id == user_id && record.is_open())
            .map(|record| record.id)
            .ok_or(BorrowsRepositoryError::LedgerEntryMissing(book_id))?;

        if let Some(account) = state.accounts.get_mut(&user_id) {
            account.borrowed_books[mirror_position].returned = true;
        }

        let book = state
            .books
            .get_mut(&book_id)
            .ok_or(BorrowsRepositoryError::BookNotFound(book_id))?;
        book.quantity += 1;
        book.availability = book.quantity > 0;
        let book = book.clone();

        let record = state
            .borrows
            .get_mut(&borrow_id)
            .ok_or(BorrowsRepositoryError::LedgerEntryMissing(book_id))?;
        record.return_date = Some(returned_at);
        record.fine = calculate_fine(record.due_date, returned_at);

        Ok(ReturnedBorrow {
            record: record.clone(),
            book,
        })
    }

    async fn list_borrow_records(&self) -> Result<Vec<BorrowRecord>, BorrowsRepositoryError> {
        Ok(self.state.read().borrows.values().cloned().collect())
    }

    async fn list_overdue_unnotified(
        &self,
        due_before: DateTime<Utc>,
    ) -> Result<Vec<BorrowRecord>, BorrowsRepositoryError> {
        Ok(self
            .state
            .read()
            .borrows
            .values()
            .filter(|record| record.is_open() && !record.notified && record.due_date < due_before)
            .cloned()
            .collect())
    }

    async fn mark_notified(&self, borrow_id: BorrowId) -> Result<bool, BorrowsRepositoryError> {
        let mut state = self.state.write();
        match state.borrows.get_mut(&borrow_id) {
            Some(record) if !record.notified => {
                record.notified = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
