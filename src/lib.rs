//! Annotation and export engine for reviewing recorded heart-rate sessions.
//!
//! Raw sessions are normalized into `Session`s, viewed through clamped index
//! windows, optionally split into segments, relabelled through an `EditState`
//! and exported as delimited text.

pub mod annotation;
pub mod config;
pub mod delivery;
pub mod error;
pub mod export;
pub mod review;
pub mod sample;
pub mod segmentation;
pub mod store;
pub mod timeline;
pub mod view;
