use anyhow::{bail, Context};
use reqwest::{Method, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use reqwest_tracing::TracingMiddleware;

use crate::api::{
    Book, BookId, BookResponse, BooksResponse, BorrowRecord, BorrowRecordsResponse,
    BorrowRequest, BorrowedBookEntry, LoginRequest, MessageResponse, MyBorrowedBooksResponse,
    NewAdminRequest, NewAdminResponse, NewBook, ProfileResponse, RegisterRequest, SessionResponse,
    UserProfile, UsersResponse, VerifyOtpRequest,
};

const MAX_RETRIES: u32 = 3;

/// Typed client of the library REST api.
/// Authenticated calls send the session token as a bearer token.
/// Only GET calls are retried, every other call is sent once.
pub struct LibraryServiceClient {
    url: String,
    retrying_client: ClientWithMiddleware,
    single_attempt_client: ClientWithMiddleware,
    token: Option<String>,
}

fn is_retry_safe(method: &Method) -> bool {
    *method == Method::GET
}

/// Message of a `{"success": false, "message": ...}` body, or the status if the body is different
async fn failure_message(response: Response) -> String {
    let status = response.status();
    match response.json::<MessageResponse>().await {
        Ok(body) => body.message,
        Err(_) => status.to_string(),
    }
}

impl LibraryServiceClient {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        Self::with_retry_policy(
            url,
            ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES),
        )
    }

    fn with_retry_policy(url: &str, retry_policy: ExponentialBackoff) -> anyhow::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .build()
            .context("Failed to build reqwest client")?;
        let retrying_client = ClientBuilder::new(reqwest_client.clone())
            // Insert the tracing middleware
            .with(TracingMiddleware::default())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        let single_attempt_client = ClientBuilder::new(reqwest_client)
            .with(TracingMiddleware::default())
            .build();

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            retrying_client,
            single_attempt_client,
            token: None,
        })
    }

    /// Same client acting with the given session token
    pub fn authenticated(self, token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            ..self
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let client = if is_retry_safe(&method) {
            &self.retrying_client
        } else {
            &self.single_attempt_client
        };
        let builder = client.request(method, format!("{}/api/v1{}", self.url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Calls POST /api/v1/auth/register
    pub async fn register(&self, request: &RegisterRequest) -> anyhow::Result<()> {
        let response = self
            .request(Method::POST, "/auth/register")
            .json(request)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to register {}", failure_message(response).await)
        }
        Ok(())
    }

    /// Calls POST /api/v1/auth/verify-otp
    pub async fn verify_otp(&self, request: &VerifyOtpRequest) -> anyhow::Result<SessionResponse> {
        let response = self
            .request(Method::POST, "/auth/verify-otp")
            .json(request)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to verify {}", failure_message(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls POST /api/v1/auth/login
    /// Returns the opened session, its token can be passed to `authenticated`
    pub async fn login(&self, email: &str, password: &str) -> anyhow::Result<SessionResponse> {
        let response = self
            .request(Method::POST, "/auth/login")
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to login {}", failure_message(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls GET /api/v1/auth/me
    pub async fn me(&self) -> anyhow::Result<UserProfile> {
        let response = self.request(Method::GET, "/auth/me").send().await?;
        if !response.status().is_success() {
            bail!("Failed to get profile {}", failure_message(response).await)
        }
        let profile: ProfileResponse = response.json().await?;
        Ok(profile.user)
    }

    /// Calls POST /api/v1/book/admin/add
    pub async fn add_book(&self, book: &NewBook) -> anyhow::Result<Book> {
        let response = self
            .request(Method::POST, "/book/admin/add")
            .json(book)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to add book {}", failure_message(response).await)
        }
        let added: BookResponse = response.json().await?;
        Ok(added.book)
    }

    /// Calls GET /api/v1/book/all
    pub async fn list_books(&self) -> anyhow::Result<Vec<Book>> {
        let response = self.request(Method::GET, "/book/all").send().await?;
        if !response.status().is_success() {
            bail!("Failed to list books {}", failure_message(response).await)
        }
        let books: BooksResponse = response.json().await?;
        Ok(books.books)
    }

    /// Calls DELETE /api/v1/book/delete/{book_id}
    pub async fn delete_book(&self, book_id: BookId) -> anyhow::Result<()> {
        let response = self
            .request(Method::DELETE, &format!("/book/delete/{book_id}"))
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to delete book {}", failure_message(response).await)
        }
        Ok(())
    }

    /// Calls POST /api/v1/borrow/record-borrow-book/{book_id}
    pub async fn record_borrow(&self, book_id: BookId, email: &str) -> anyhow::Result<String> {
        let response = self
            .request(Method::POST, &format!("/borrow/record-borrow-book/{book_id}"))
            .json(&BorrowRequest {
                email: email.to_string(),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to record borrow {}", failure_message(response).await)
        }
        let body: MessageResponse = response.json().await?;
        Ok(body.message)
    }

    /// Calls PUT /api/v1/borrow/return-borrowed-book/{book_id}
    /// Returns the charge summary
    pub async fn return_borrow(&self, book_id: BookId, email: &str) -> anyhow::Result<String> {
        let response = self
            .request(Method::PUT, &format!("/borrow/return-borrowed-book/{book_id}"))
            .json(&BorrowRequest {
                email: email.to_string(),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to return book {}", failure_message(response).await)
        }
        let body: MessageResponse = response.json().await?;
        Ok(body.message)
    }

    /// Calls GET /api/v1/borrow/my-borrowed-books
    pub async fn my_borrowed_books(&self) -> anyhow::Result<Vec<BorrowedBookEntry>> {
        let response = self
            .request(Method::GET, "/borrow/my-borrowed-books")
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to list borrowed books {}", failure_message(response).await)
        }
        let body: MyBorrowedBooksResponse = response.json().await?;
        Ok(body.borrowed_books)
    }

    /// Calls GET /api/v1/borrow/borrowed-books-by-users
    pub async fn borrowed_books_by_users(&self) -> anyhow::Result<Vec<BorrowRecord>> {
        let response = self
            .request(Method::GET, "/borrow/borrowed-books-by-users")
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to list ledger {}", failure_message(response).await)
        }
        let body: BorrowRecordsResponse = response.json().await?;
        Ok(body.borrowed_books)
    }

    /// Calls GET /api/v1/user/all
    pub async fn list_users(&self) -> anyhow::Result<Vec<UserProfile>> {
        let response = self.request(Method::GET, "/user/all").send().await?;
        if !response.status().is_success() {
            bail!("Failed to list users {}", failure_message(response).await)
        }
        let body: UsersResponse = response.json().await?;
        Ok(body.users)
    }

    /// Calls POST /api/v1/user/add/new-admin
    pub async fn add_admin(&self, request: &NewAdminRequest) -> anyhow::Result<UserProfile> {
        let response = self
            .request(Method::POST, "/user/add/new-admin")
            .json(request)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to add admin {}", failure_message(response).await)
        }
        let body: NewAdminResponse = response.json().await?;
        Ok(body.admin)
    }
}
