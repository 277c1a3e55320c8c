//! Everything that turns a built story into bytes, and back.
pub mod archive;
pub mod bin;
pub mod text;
