//! # Field Survey
//!
//! Client core for field price surveys: surveyors pick a task, record an
//! observation per product with a price and geo-tagged photo evidence, and
//! watch their per-task completion update as records are saved.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  ┌──────────┐  ┌───────────┐      ┌────────────┐
//! │  Camera  │─▶│ Capture  │─▶│ Watermark │─────▶│   Draft    │
//! └──────────┘  │ pipeline │  └───────────┘      │   record   │
//!               └────┬─────┘                     └─────┬──────┘
//!                    │ GeoLocator                      │
//!                    ▼                                 ▼
//!               ┌──────────┐                    ┌────────────┐  ┌──────────┐
//!               │   GPS    │                    │ Submitter  │─▶│ Uploader │
//!               └──────────┘                    └─────┬──────┘  └────┬─────┘
//!                                                     │              │
//!               ┌────────────┐                  ┌─────▼──────────────▼─────┐
//!               │ Reconciler │◀─────────────────│     HTTP adapter         │
//!               └────────────┘   completion     └──────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Tasks, drafts, records, photos |
//! | [`error`] | Error taxonomy |
//! | [`traits`] | Backend, device, and session seams |
//! | [`config`] | TOML configuration |
//! | [`session`] | Logged-in surveyor context |
//! | [`geo`] | Bounded-wait location and geocoding |
//! | [`watermark`] | Time/location watermark rendering |
//! | [`capture`] | Photo capture pipeline |
//! | [`uploader`] | Single-photo upload |
//! | [`submit`] | Record validation and submission |
//! | [`reconcile`] | Task completion reconciliation |
//! | [`records`] | Record history, edit and delete |
//! | [`progress`] | Submission progress reporting |
//! | [`client`] | HTTP adapter for the backend |

pub mod capture;
pub mod client;
pub mod config;
pub mod error;
pub mod geo;
pub mod models;
pub mod progress;
pub mod reconcile;
pub mod records;
pub mod session;
pub mod submit;
pub mod traits;
pub mod uploader;
pub mod watermark;
