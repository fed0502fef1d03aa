pub mod constants;
pub mod driver;
pub mod error;
pub mod fetch;
pub mod format;
pub mod joblog;
pub mod jobs;
pub mod listing;
pub mod manifest;
pub mod nds;
pub mod omicron;
pub mod osdf;
pub mod package;
pub mod stream;
