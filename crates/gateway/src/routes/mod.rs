pub mod admin;
pub mod attachments;
pub mod auth;
pub mod catalog;
pub mod health;
pub mod messages;
pub mod models;
pub mod privacy;
pub mod profile;
pub mod rooms;
pub mod websocket;
