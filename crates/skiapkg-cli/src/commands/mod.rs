pub mod download;
pub mod generate;
pub mod install;
pub mod version;
