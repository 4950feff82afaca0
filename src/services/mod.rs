//! Business services.

pub mod dialog;
