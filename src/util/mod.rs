//! Utility modules for xmlcursor.
//!
//! Contains `QName` handling and XML name-character checks.

pub mod qname;
