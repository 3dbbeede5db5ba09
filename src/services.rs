pub mod connection_service;
pub use connection_service::ConnectionService;
pub mod identity_service;
pub use identity_service::IdentityService;
pub mod ledger_service;
pub use ledger_service::LedgerService;
pub mod normalizer;
pub mod realtime;
pub use realtime::RealtimeHub;
pub mod uazapi;
