pub mod auth;
pub mod connection;
pub mod contact;
pub mod conversation;
pub mod funnel;
pub mod message;
pub mod realtime;
