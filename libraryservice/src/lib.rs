pub mod api;
pub mod money;

#[cfg(any(feature = "client", test))]
pub mod client;

#[cfg(any(feature = "server", test))]
pub mod app_config;
#[cfg(any(feature = "server", test))]
pub mod auth_engine;
#[cfg(any(feature = "server", test))]
pub mod borrow_engine;
#[cfg(any(feature = "server", test))]
pub mod capability;
#[cfg(any(feature = "server", test))]
pub mod credentials;
#[cfg(any(feature = "server", test))]
pub mod error;
#[cfg(any(feature = "server", test))]
pub mod fine;
#[cfg(any(feature = "server", test))]
mod handlers;
#[cfg(any(feature = "server", test))]
pub mod library_repository;
#[cfg(any(feature = "server", test))]
pub mod mailer;
#[cfg(any(feature = "server", test))]
pub mod session;
#[cfg(any(feature = "server", test))]
pub mod settings;
#[cfg(any(feature = "server", test))]
pub mod sweeps;
#[cfg(feature = "server")]
pub mod telemetry;
