//! CLI Commands

pub mod manifest;
pub mod verify;
