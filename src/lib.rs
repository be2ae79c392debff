//! Tweetrelay Library
//!
//! Polls Twitter/X (or Nitter mirrors) for new posts from a fixed set of
//! accounts and relays them into a Discord channel.

pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod poll;
pub mod services;
