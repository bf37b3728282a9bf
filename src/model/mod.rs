//! Core data model types for email addresses.

pub mod address;
