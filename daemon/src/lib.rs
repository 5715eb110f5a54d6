pub mod config;
pub mod display;
pub mod error;
pub mod http;
pub mod key_input;
pub mod link;
pub mod sync_loop;
