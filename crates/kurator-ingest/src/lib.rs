//! Kurator Ingest Library
//!
//! Extraction jobs for the kurator warehouse. Each job pulls from one
//! external source (an API or a file export), writes a header-bearing CSV
//! extract, and declares its warehouse destination through
//! [`kurator_db::Dataset`]; merging the extract into the warehouse is
//! entirely the load layer's business.
//!
//! # Sources
//!
//! - **App Store**: customer reviews from the iTunes RSS feed
//! - **gomus**: booking report exports from the booking system
//! - **Google Trends**: topic id/name mappings

pub mod appstore;
pub mod gomus;
pub mod gtrends;
