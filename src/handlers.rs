pub mod conversations;
pub mod realtime;
pub mod webhooks;
pub mod whatsapp;
