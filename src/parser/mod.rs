//! Email header parsing: header blocks and encoded-word decoding.

pub mod header;
