use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Row};

use crate::api::{
    Book, BookId, BorrowId, BorrowRecord, BorrowedBookEntry, BorrowerSnapshot, Money, NewBook,
    Role, UserId,
};
use crate::fine::calculate_fine;
use crate::library_repository::{
    Account, AccountsRepository, AccountsRepositoryError, BooksRepository, BooksRepositoryError,
    BorrowsRepository, BorrowsRepositoryError, NewAccount, PasswordReset, ReturnedBorrow,
    VerificationCode, LOAN_PERIOD_DAYS,
};

const BOOK_COLUMNS: &str = "id, title, author, description, price_cents, quantity, availability";
const ACCOUNT_COLUMNS: &str = "id, name, email, password_hash, role, account_verified, \
     verification_code, verification_code_expire, reset_password_token, reset_password_expire, \
     borrowed_books, created_at";
const BORROW_COLUMNS: &str = "id, user_id, user_name, user_email, book_id, price_cents, \
     borrow_date, due_date, return_date, fine_cents, notified";

pub struct PostgresLibraryRepositoryConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
}

/// Catalog, accounts and ledger in one postgres database.
/// The client sits behind a mutex because borrow and return run as transactions.
pub struct PostgresLibraryRepository {
    client: tokio::sync::Mutex<Client>,
}

impl PostgresLibraryRepository {
    pub async fn init(config: PostgresLibraryRepositoryConfig) -> anyhow::Result<Self> {
        let connection_str = format!(
            "postgresql://{}:{}@{}",
            config.username, config.password, config.hostname
        );
        tracing::info!("Postgres host: {}", config.hostname);
        let (client, connection) = tokio_postgres::connect(&connection_str, NoTls)
            .await
            .context("Failed to start postgres")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Postgres connection error: {}", e);
            }
        });

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS books (
            id              SERIAL PRIMARY KEY,
            title           TEXT NOT NULL,
            author          TEXT NOT NULL,
            description     TEXT NOT NULL,
            price_cents     BIGINT NOT NULL,
            quantity        INTEGER NOT NULL CHECK (quantity >= 0),
            availability    BOOLEAN NOT NULL
            )
        ",
            )
            .await
            .context("Failed to setup books table")?;

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS accounts (
            id                          SERIAL PRIMARY KEY,
            name                        TEXT NOT NULL,
            email                       TEXT NOT NULL,
            password_hash               TEXT NOT NULL,
            role                        TEXT NOT NULL,
            account_verified            BOOLEAN NOT NULL DEFAULT FALSE,
            verification_code           INTEGER,
            verification_code_expire    TIMESTAMPTZ,
            reset_password_token        TEXT,
            reset_password_expire       TIMESTAMPTZ,
            borrowed_books              JSONB NOT NULL DEFAULT '[]'::jsonb,
            created_at                  TIMESTAMPTZ NOT NULL
            );
        CREATE UNIQUE INDEX IF NOT EXISTS accounts_verified_email
            ON accounts (email) WHERE account_verified;
        CREATE INDEX IF NOT EXISTS accounts_unverified_created_at
            ON accounts (created_at) WHERE NOT account_verified;
        ",
            )
            .await
            .context("Failed to setup accounts table")?;

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS borrows (
            id              SERIAL PRIMARY KEY,
            user_id         INTEGER NOT NULL,
            user_name       TEXT NOT NULL,
            user_email      TEXT NOT NULL,
            book_id         INTEGER NOT NULL,
            price_cents     BIGINT NOT NULL,
            borrow_date     TIMESTAMPTZ NOT NULL,
            due_date        TIMESTAMPTZ NOT NULL,
            return_date     TIMESTAMPTZ,
            fine_cents      BIGINT NOT NULL DEFAULT 0,
            notified        BOOLEAN NOT NULL DEFAULT FALSE
            );
        CREATE UNIQUE INDEX IF NOT EXISTS borrows_open_per_user_and_book
            ON borrows (user_id, book_id) WHERE return_date IS NULL;
        ",
            )
            .await
            .context("Failed to setup borrows table")?;

        Ok(Self {
            client: tokio::sync::Mutex::new(client),
        })
    }
}

fn is_unique_violation(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&SqlState::UNIQUE_VIOLATION)
}

fn book_from_row(row: &Row) -> Result<Book, tokio_postgres::Error> {
    Ok(Book {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        description: row.try_get("description")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        quantity: row.try_get("quantity")?,
        availability: row.try_get("availability")?,
    })
}

fn account_from_row(row: &Row) -> Result<Account, AccountsRepositoryError> {
    let role: String = row.try_get("role")?;
    let code: Option<i32> = row.try_get("verification_code")?;
    let code_expire: Option<DateTime<Utc>> = row.try_get("verification_code_expire")?;
    let reset_token: Option<String> = row.try_get("reset_password_token")?;
    let reset_expire: Option<DateTime<Utc>> = row.try_get("reset_password_expire")?;
    let borrowed_books: serde_json::Value = row.try_get("borrowed_books")?;

    Ok(Account {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: role.parse().map_err(AccountsRepositoryError::Other)?,
        account_verified: row.try_get("account_verified")?,
        verification: code.zip(code_expire).map(|(code, expires_at)| VerificationCode {
            code: code as u32,
            expires_at,
        }),
        password_reset: reset_token
            .zip(reset_expire)
            .map(|(token_hash, expires_at)| PasswordReset {
                token_hash,
                expires_at,
            }),
        borrowed_books: serde_json::from_value(borrowed_books)?,
        created_at: row.try_get("created_at")?,
    })
}

fn borrow_from_row(row: &Row) -> Result<BorrowRecord, tokio_postgres::Error> {
    Ok(BorrowRecord {
        id: row.try_get("id")?,
        user: BorrowerSnapshot {
            id: row.try_get("user_id")?,
            name: row.try_get("user_name")?,
            email: row.try_get("user_email")?,
        },
        book: row.try_get("book_id")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        borrow_date: row.try_get("borrow_date")?,
        due_date: row.try_get("due_date")?,
        return_date: row.try_get("return_date")?,
        fine: Money::from_cents(row.try_get("fine_cents")?),
        notified: row.try_get("notified")?,
    })
}

impl From<AccountsRepositoryError> for BorrowsRepositoryError {
    fn from(err: AccountsRepositoryError) -> Self {
        match err {
            AccountsRepositoryError::DatabaseFailure(err) => {
                BorrowsRepositoryError::DatabaseFailure(err)
            }
            AccountsRepositoryError::DeserializationError(err) => {
                BorrowsRepositoryError::DeserializationError(err)
            }
            other => BorrowsRepositoryError::Other(other.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl BooksRepository for PostgresLibraryRepository {
    async fn add_book(&self, book: NewBook) -> Result<Book, BooksRepositoryError> {
        let client = self.client.lock().await;
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO books (title, author, description, price_cents, quantity, availability) \
                     VALUES ($1, $2, $3, $4, $5, $6) RETURNING {BOOK_COLUMNS}"
                ),
                &[
                    &book.title,
                    &book.author,
                    &book.description,
                    &book.price.cents(),
                    &book.quantity,
                    &(book.quantity > 0),
                ],
            )
            .await?;
        Ok(book_from_row(&row)?)
    }

    async fn get_book(&self, book_id: BookId) -> Result<Book, BooksRepositoryError> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = $1"),
                &[&book_id],
            )
            .await?
            .ok_or(BooksRepositoryError::NotFound(book_id))?;
        Ok(book_from_row(&row)?)
    }

    async fn list_books(&self) -> Result<Vec<Book>, BooksRepositoryError> {
        let client = self.client.lock().await;
        let rows = client
            .query(&format!("SELECT {BOOK_COLUMNS} FROM books ORDER BY id"), &[])
            .await?;
        rows.iter()
            .map(|row| book_from_row(row).map_err(BooksRepositoryError::from))
            .collect()
    }

    async fn delete_book(&self, book_id: BookId) -> Result<(), BooksRepositoryError> {
        let mut client = self.client.lock().await;
        let transaction = client.transaction().await?;

        transaction
            .query_opt("SELECT id FROM books WHERE id = $1 FOR UPDATE", &[&book_id])
            .await?
            .ok_or(BooksRepositoryError::NotFound(book_id))?;

        let open_borrow = transaction
            .query_opt(
                "SELECT id FROM borrows WHERE book_id = $1 AND return_date IS NULL LIMIT 1",
                &[&book_id],
            )
            .await?;
        if open_borrow.is_some() {
            return Err(BooksRepositoryError::HasOpenBorrows(book_id));
        }

        transaction
            .execute("DELETE FROM books WHERE id = $1", &[&book_id])
            .await?;
        transaction.commit().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AccountsRepository for PostgresLibraryRepository {
    async fn create_account(&self, account: NewAccount) -> Result<UserId, AccountsRepositoryError> {
        let client = self.client.lock().await;
        let code = account.verification.as_ref().map(|v| v.code as i32);
        let code_expire = account.verification.as_ref().map(|v| v.expires_at);
        let result = client
            .query_one(
                "INSERT INTO accounts (name, email, password_hash, role, account_verified, \
                 verification_code, verification_code_expire, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
                &[
                    &account.name,
                    &account.email,
                    &account.password_hash,
                    &account.role.as_str(),
                    &account.account_verified,
                    &code,
                    &code_expire,
                    &account.created_at,
                ],
            )
            .await;

        match result {
            Ok(row) => Ok(row.try_get(0)?),
            Err(err) if is_unique_violation(&err) => {
                Err(AccountsRepositoryError::EmailTaken(account.email))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_account(&self, user_id: UserId) -> Result<Account, AccountsRepositoryError> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"),
                &[&user_id],
            )
            .await?
            .ok_or(AccountsRepositoryError::NotFound(user_id))?;
        account_from_row(&row)
    }

    async fn find_verified_account(
        &self,
        email: &str,
    ) -> Result<Option<Account>, AccountsRepositoryError> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1 AND account_verified"
                ),
                &[&email],
            )
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn list_unverified_accounts(
        &self,
        email: &str,
    ) -> Result<Vec<Account>, AccountsRepositoryError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts \
                     WHERE email = $1 AND NOT account_verified \
                     ORDER BY created_at DESC, id DESC"
                ),
                &[&email],
            )
            .await?;
        rows.iter().map(account_from_row).collect()
    }

    async fn list_verified_accounts(&self) -> Result<Vec<Account>, AccountsRepositoryError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_verified ORDER BY id"),
                &[],
            )
            .await?;
        rows.iter().map(account_from_row).collect()
    }

    async fn mark_verified(&self, user_id: UserId) -> Result<bool, AccountsRepositoryError> {
        let client = self.client.lock().await;
        let result = client
            .execute(
                "UPDATE accounts SET account_verified = TRUE, verification_code = NULL, \
                 verification_code_expire = NULL \
                 WHERE id = $1 AND NOT account_verified",
                &[&user_id],
            )
            .await;

        match result {
            Ok(1) => Ok(true),
            Ok(_) => {
                let exists = client
                    .query_opt("SELECT id FROM accounts WHERE id = $1", &[&user_id])
                    .await?;
                match exists {
                    Some(_) => Ok(false),
                    None => Err(AccountsRepositoryError::NotFound(user_id)),
                }
            }
            Err(err) if is_unique_violation(&err) => Err(AccountsRepositoryError::EmailTaken(
                format!("account {user_id}"),
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_unverified_except(
        &self,
        email: &str,
        keep: UserId,
    ) -> Result<u64, AccountsRepositoryError> {
        let client = self.client.lock().await;
        Ok(client
            .execute(
                "DELETE FROM accounts WHERE email = $1 AND NOT account_verified AND id <> $2",
                &[&email, &keep],
            )
            .await?)
    }

    async fn delete_unverified_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, AccountsRepositoryError> {
        let client = self.client.lock().await;
        Ok(client
            .execute(
                "DELETE FROM accounts WHERE NOT account_verified AND created_at < $1",
                &[&cutoff],
            )
            .await?)
    }

    async fn set_password_reset(
        &self,
        user_id: UserId,
        reset: Option<PasswordReset>,
    ) -> Result<(), AccountsRepositoryError> {
        let client = self.client.lock().await;
        let token_hash = reset.as_ref().map(|r| r.token_hash.clone());
        let expires_at = reset.as_ref().map(|r| r.expires_at);
        let updated = client
            .execute(
                "UPDATE accounts SET reset_password_token = $1, reset_password_expire = $2 \
                 WHERE id = $3",
                &[&token_hash, &expires_at, &user_id],
            )
            .await?;
        if updated == 0 {
            return Err(AccountsRepositoryError::NotFound(user_id));
        }
        Ok(())
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<Account>, AccountsRepositoryError> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts \
                     WHERE reset_password_token = $1 AND account_verified"
                ),
                &[&token_hash],
            )
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn reset_password(
        &self,
        user_id: UserId,
        token_hash: &str,
        password_hash: String,
    ) -> Result<bool, AccountsRepositoryError> {
        let client = self.client.lock().await;
        let updated = client
            .execute(
                "UPDATE accounts SET password_hash = $1, reset_password_token = NULL, \
                 reset_password_expire = NULL \
                 WHERE id = $2 AND reset_password_token = $3",
                &[&password_hash, &user_id, &token_hash],
            )
            .await?;
        Ok(updated > 0)
    }

    async fn update_password(
        &self,
        user_id: UserId,
        password_hash: String,
    ) -> Result<(), AccountsRepositoryError> {
        let client = self.client.lock().await;
        let updated = client
            .execute(
                "UPDATE accounts SET password_hash = $1, reset_password_token = NULL, \
                 reset_password_expire = NULL WHERE id = $2",
                &[&password_hash, &user_id],
            )
            .await?;
        if updated == 0 {
            return Err(AccountsRepositoryError::NotFound(user_id));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BorrowsRepository for PostgresLibraryRepository {
    async fn record_borrow(
        &self,
        book_id: BookId,
        email: &str,
        borrowed_at: DateTime<Utc>,
    ) -> Result<BorrowRecord, BorrowsRepositoryError> {
        let mut client = self.client.lock().await;
        let transaction = client.transaction().await?;

        let book_row = transaction
            .query_opt(
                &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = $1 FOR UPDATE"),
                &[&book_id],
            )
            .await?
            .ok_or(BorrowsRepositoryError::BookNotFound(book_id))?;
        let book = book_from_row(&book_row)?;

        let account_row = transaction
            .query_opt(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts \
                     WHERE email = $1 AND account_verified FOR UPDATE"
                ),
                &[&email],
            )
            .await?
            .ok_or_else(|| BorrowsRepositoryError::UserNotFound(email.to_string()))?;
        let account = account_from_row(&account_row)?;

        if book.quantity <= 0 {
            return Err(BorrowsRepositoryError::BookUnavailable(book_id));
        }
        if account.open_borrow_of(book_id).is_some() {
            return Err(BorrowsRepositoryError::AlreadyBorrowed(book_id));
        }

        let decremented = transaction
            .query_opt(
                "UPDATE books SET quantity = quantity - 1, availability = quantity - 1 > 0 \
                 WHERE id = $1 AND quantity > 0 RETURNING quantity",
                &[&book_id],
            )
            .await?;
        if decremented.is_none() {
            return Err(BorrowsRepositoryError::BookUnavailable(book_id));
        }

        let due_date = borrowed_at + Duration::days(LOAN_PERIOD_DAYS);
        let inserted = transaction
            .query_one(
                "INSERT INTO borrows (user_id, user_name, user_email, book_id, price_cents, \
                 borrow_date, due_date) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
                &[
                    &account.id,
                    &account.name,
                    &account.email,
                    &book_id,
                    &book.price.cents(),
                    &borrowed_at,
                    &due_date,
                ],
            )
            .await;
        let borrow_id: BorrowId = match inserted {
            Ok(row) => row.try_get(0)?,
            Err(err) if is_unique_violation(&err) => {
                return Err(BorrowsRepositoryError::AlreadyBorrowed(book_id))
            }
            Err(err) => return Err(err.into()),
        };

        let entry = BorrowedBookEntry {
            borrow_id,
            book_id,
            book_title: book.title.clone(),
            borrowed_date: borrowed_at,
            due_date,
            returned: false,
        };
        transaction
            .execute(
                "UPDATE accounts SET borrowed_books = borrowed_books || $1::jsonb WHERE id = $2",
                &[&json!([entry]), &account.id],
            )
            .await?;

        transaction.commit().await?;

        Ok(BorrowRecord {
            id: borrow_id,
            user: BorrowerSnapshot {
                id: account.id,
                name: account.name,
                email: account.email,
            },
            book: book_id,
            price: book.price,
            borrow_date: borrowed_at,
            due_date,
            return_date: None,
            fine: Money::ZERO,
            notified: false,
        })
    }

    async fn return_borrow(
        &self,
        book_id: BookId,
        email: &str,
        returned_at: DateTime<Utc>,
    ) -> Result<ReturnedBorrow, BorrowsRepositoryError> {
        let mut client = self.client.lock().await;
        let transaction = client.transaction().await?;

        transaction
            .query_opt("SELECT id FROM books WHERE id = $1 FOR UPDATE", &[&book_id])
            .await?
            .ok_or(BorrowsRepositoryError::BookNotFound(book_id))?;

        let account_row = transaction
            .query_opt(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts \
                     WHERE email = $1 AND account_verified FOR UPDATE"
                ),
                &[&email],
            )
            .await?
            .ok_or_else(|| BorrowsRepositoryError::UserNotFound(email.to_string()))?;
        let mut account = account_from_row(&account_row)?;

        let mirror_entry = account
            .borrowed_books
            .iter_mut()
            .find(|entry| entry.book_id == book_id && !entry.returned)
            .ok_or(BorrowsRepositoryError::NotBorrowed(book_id))?;
        mirror_entry.returned = true;

        let borrow_row = transaction
            .query_opt(
                &format!(
                    "SELECT {BORROW_COLUMNS} FROM borrows \
                     WHERE book_id = $1 AND user_id = $2 AND return_date IS NULL FOR UPDATE"
                ),
                &[&book_id, &account.id],
            )
            .await?
            .ok_or(BorrowsRepositoryError::LedgerEntryMissing(book_id))?;
        let mut record = borrow_from_row(&borrow_row)?;
        record.return_date = Some(returned_at);
        record.fine = calculate_fine(record.due_date, returned_at);

        transaction
            .execute(
                "UPDATE borrows SET return_date = $1, fine_cents = $2 WHERE id = $3",
                &[&returned_at, &record.fine.cents(), &record.id],
            )
            .await?;

        let book_row = transaction
            .query_one(
                &format!(
                    "UPDATE books SET quantity = quantity + 1, availability = TRUE \
                     WHERE id = $1 RETURNING {BOOK_COLUMNS}"
                ),
                &[&book_id],
            )
            .await?;
        let book = book_from_row(&book_row)?;

        transaction
            .execute(
                "UPDATE accounts SET borrowed_books = $1 WHERE id = $2",
                &[&serde_json::to_value(&account.borrowed_books)?, &account.id],
            )
            .await?;

        transaction.commit().await?;

        Ok(ReturnedBorrow { record, book })
    }

    async fn list_borrow_records(&self) -> Result<Vec<BorrowRecord>, BorrowsRepositoryError> {
        let client = self.client.lock().await;
        let rows = client
            .query(&format!("SELECT {BORROW_COLUMNS} FROM borrows ORDER BY id"), &[])
            .await?;
        rows.iter()
            .map(|row| borrow_from_row(row).map_err(BorrowsRepositoryError::from))
            .collect()
    }

    async fn list_overdue_unnotified(
        &self,
        due_before: DateTime<Utc>,
    ) -> Result<Vec<BorrowRecord>, BorrowsRepositoryError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                &format!(
                    "SELECT {BORROW_COLUMNS} FROM borrows \
                     WHERE due_date < $1 AND return_date IS NULL AND NOT notified ORDER BY id"
                ),
                &[&due_before],
            )
            .await?;
        rows.iter()
            .map(|row| borrow_from_row(row).map_err(BorrowsRepositoryError::from))
            .collect()
    }

    async fn mark_notified(&self, borrow_id: BorrowId) -> Result<bool, BorrowsRepositoryError> {
        let client = self.client.lock().await;
        let updated = client
            .execute(
                "UPDATE borrows SET notified = TRUE WHERE id = $1 AND NOT notified",
                &[&borrow_id],
            )
            .await?;
        Ok(updated > 0)
    }
}
