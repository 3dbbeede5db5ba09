pub mod connection_repo;
pub use connection_repo::ConnectionRepository;
pub mod contact_repo;
pub use contact_repo::ContactRepository;
pub mod conversation_repo;
pub use conversation_repo::ConversationRepository;
pub mod funnel_repo;
pub use funnel_repo::FunnelRepository;
pub mod message_repo;
pub use message_repo::MessageRepository;
