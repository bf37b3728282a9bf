//! `maildir2addr`: harvest e-mail addresses from maildir trees.
//!
//! This crate provides the core library for reading message headers,
//! extracting and normalizing addresses, filtering them through regex
//! exclusion rules, and maintaining a persistent TSV address book.

pub mod config;
pub mod error;
pub mod exclude;
pub mod model;
pub mod parser;
pub mod scanner;
pub mod session;
pub mod store;
